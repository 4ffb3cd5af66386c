//! 记忆层：单会话对话历史（不跨进程持久化）

pub mod conversation;

pub use conversation::{ConversationMemory, Message, Role};
