pub mod decorations;
pub mod ledger;

pub use decorations::DecorationTable;
pub use ledger::ReplyLedger;
