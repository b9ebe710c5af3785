pub const DEFAULT_PUBSUB: &str = "memory";
pub const DEFAULT_MESSAGE_SIZES: &str = "16,64,256";
