pub mod detector;
pub mod error;
pub mod severity;

pub use detector::{AnomalyCheck, AnomalyDetector, NotificationCallback};
pub use error::{AnomalyError, Result};
pub use severity::{classify, AnomalySeverity};
