mod kv;
pub use kv::KeyValue;

mod process_env;
pub use process_env::ProcessEnv;

mod encoding;
pub use encoding::OutputEncoding;

mod outcome;
pub use outcome::InvocationOutcome;

/// Interval value in milliseconds.
///
/// Used by configuration sections where a duration must survive serialization as a plain number.
pub type DurationMs = u64;
