pub mod clock;
pub use clock::{rfc3339_now, unix_seconds};
