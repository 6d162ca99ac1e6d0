// src/threads/names.rs

//! Well-known activity names shared by every producer and consumer

/// Storage module: block-device discovery finished
pub const THREAD_WAIT_FOR_STORAGE: &str = "wait-for-storage";

/// Storage module: device watcher
pub const THREAD_STORAGE_WATCHER: &str = "storage-watcher";

/// Storage module: requested layout committed in memory
pub const THREAD_EXECUTE_STORAGE: &str = "execute-storage";

/// Network module: connectivity policy decided
pub const THREAD_WAIT_FOR_CONNECTING_NM: &str = "wait-for-connecting-network";

/// Subscription workflow running in the background
pub const THREAD_SUBSCRIPTION: &str = "subscription";

/// Restart supervisor owned by the payload manager
pub const THREAD_PAYLOAD_RESTART: &str = "payload-restart";

/// Preparation pipeline owned by the payload manager
pub const THREAD_PAYLOAD: &str = "payload";

/// Activities the pipeline waits on before touching storage-backed sources
pub const STORAGE_THREADS: [&str; 3] = [
    THREAD_WAIT_FOR_STORAGE,
    THREAD_STORAGE_WATCHER,
    THREAD_EXECUTE_STORAGE,
];
