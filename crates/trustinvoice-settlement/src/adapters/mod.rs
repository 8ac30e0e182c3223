pub mod evm;
pub mod algorand;

pub use evm::EvmAdapter;
pub use algorand::AlgorandAdapter;
