pub use crate::{
    AlertEvent, AlertStream, ApiClient, ChatSession, ChatUpdate, ClientConfig, ClientError,
    FinalAnswer, FoldOutcome, Frame, Message, ReadyState, ReassemblyPolicy, Sender, Snapshot,
};
