pub mod log;
pub mod onesignal;

pub use log::LogPushProvider;
pub use onesignal::OneSignalProvider;
