pub mod correlator;
pub mod gateway;

pub use correlator::{PendingVoice, VoiceDescriptor, VoiceSessionCorrelator};
pub use gateway::GatewaySender;
