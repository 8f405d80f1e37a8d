//! Pool box model and canonical register serialization.

pub mod pool;
pub mod registers;

pub use pool::{DepositIntent, NullifierState, PoolBox, WithdrawIntent, MIN_BOX_VALUE};
pub use registers::{AvlTreeData, RegisterValue};
