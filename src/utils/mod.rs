mod convert;
mod format;

pub use convert::lamports_to_sol;
pub use convert::sol_to_lamports;
pub use convert::signed_lamports_to_sol;
pub use convert::LAMPORTS_PER_SOL;
pub use format::format_pubkey;
pub use format::short_address;
pub use format::format_duration;
pub use format::format_sol;
