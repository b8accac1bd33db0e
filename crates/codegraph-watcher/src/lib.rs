pub mod bridge;

pub use bridge::{NullWatchEventSink, WatchEventSink, WatcherBridge};
