pub mod pool;
mod position;
mod trade;

pub use pool::Pool;
pub use position::Position;
pub use trade::{TradeRecord, TradeSide, TradeStatus};
