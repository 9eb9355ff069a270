pub mod config_store;
pub mod control;
pub mod link;

pub use config_store::XrayConfigFile;
pub use control::{
    CommandRunner, RecordedOutcome, RecordingRunner, SystemCommandRunner, XrayReloader,
};
