pub mod errors;
pub mod locator;
pub mod patcher;
pub mod scanner;
pub mod settings;

pub use errors::{PatchError, ScanError};
pub use locator::{locate, BlockMatch, BlockSelector, ConfigBlock};
pub use patcher::{apply, AbsentPolicy, PatchOperation, SettingChange, SettingPatch};
pub use scanner::check_balance;
pub use settings::{parse_entries, SettingEntry, SettingValue};
