#[cfg(test)]
#[allow(dead_code)]
pub mod simulate_blockchain;
pub use simulate_blockchain::*;

#[cfg(test)]
#[allow(dead_code)]
pub mod test_data;
pub use test_data::*;
