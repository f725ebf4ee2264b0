use clap::{Parser, Subcommand};

use crate::config::{AppConfig, Transport};

#[derive(Debug, Parser)]
#[command(name = "signals", version, about = "Streaming market signal services")]
pub struct Cli {
    #[command(subcommand)]
    pub service: ServiceCmd,

    /// Where events come from and go to (overrides TRANSPORT)
    #[arg(long, global = true, value_enum)]
    pub transport: Option<Transport>,

    /// Health server port (overrides PORT)
    #[arg(long, global = true)]
    pub port: Option<u16>,
}

#[derive(Debug, Clone, Subcommand)]
pub enum ServiceCmd {
    /// SMA 20/50 crossover detector: prices in, signals out
    MaDetector,

    /// 24h volume spike detector: prices in, signals out
    VolumeDetector {
        /// Spike multiplier that must be exceeded (overrides SPIKE_THRESHOLD)
        #[arg(long)]
        threshold: Option<f64>,
    },

    /// Per-symbol rate-limited alerts: signals in, alerts out
    AlertService {
        /// Minimum minutes between alerts for one symbol (overrides COOLDOWN_MINUTES)
        #[arg(long)]
        cooldown_minutes: Option<i64>,

        /// Publish alerts to ALERT_TOPIC instead of printing them
        #[arg(long)]
        publish: bool,
    },
}

impl ServiceCmd {
    pub fn name(&self) -> &'static str {
        match self {
            ServiceCmd::MaDetector => "ma-detector",
            ServiceCmd::VolumeDetector { .. } => "volume-detector",
            ServiceCmd::AlertService { .. } => "alert-service",
        }
    }

    pub fn default_group_id(&self) -> &'static str {
        match self {
            ServiceCmd::MaDetector => "ma-signal-detector",
            ServiceCmd::VolumeDetector { .. } => "volume-spike-detector",
            ServiceCmd::AlertService { .. } => "alert-service",
        }
    }
}

impl Cli {
    /// Folds command-line overrides into the environment config.
    pub fn apply(&self, cfg: &mut AppConfig) {
        if let Some(t) = self.transport {
            cfg.transport = t;
        }
        if let Some(p) = self.port {
            cfg.port = p;
        }

        match &self.service {
            ServiceCmd::VolumeDetector {
                threshold: Some(t),
            } => cfg.spike_threshold = *t,
            ServiceCmd::AlertService {
                cooldown_minutes: Some(m),
                ..
            } => cfg.cooldown_minutes = *m,
            _ => {}
        }

        if cfg.kafka_group_id.is_none() {
            cfg.kafka_group_id = Some(self.service.default_group_id().to_string());
        }
    }
}
