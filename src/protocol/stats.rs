use serde::Deserialize;

/// Node statistics, pushed as `stats` frames and served by `GET /v4/stats`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    /// Total player count on the node.
    pub players: i32,
    /// Players currently playing audio.
    pub playing_players: i32,
    /// Node uptime in milliseconds.
    pub uptime: u64,
    pub memory: Memory,
    pub cpu: Cpu,
    /// Frame stats. Only present in socket stats (not REST).
    #[serde(default)]
    pub frame_stats: Option<FrameStats>,
}

impl Stats {
    /// System-wide CPU load used to rank nodes.
    pub fn system_load(&self) -> f64 {
        self.cpu.system_load
    }
}

/// Memory statistics.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Memory {
    /// Free memory in bytes.
    pub free: u64,
    /// Used memory in bytes.
    pub used: u64,
    /// Allocated (total) memory in bytes.
    pub allocated: u64,
    /// Maximum reservable memory in bytes.
    pub reservable: u64,
}

/// CPU statistics.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cpu {
    /// Logical core count.
    pub cores: i32,
    /// System-wide CPU load (0.0–1.0).
    pub system_load: f64,
    /// Node process CPU load normalized across cores (0.0–1.0).
    pub lavalink_load: f64,
}

/// Audio frame delivery statistics.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameStats {
    /// Average frames sent per player (last minute).
    #[serde(default)]
    pub sent: i32,
    /// Average null frames per player (last minute).
    #[serde(default)]
    pub nulled: i32,
    /// Average frame deficit per player (expected − sent − nulled).
    #[serde(default)]
    pub deficit: i32,
}
