use std::{ffi::OsString, path::PathBuf};

use clap::Parser;
use dotweave::{FailurePolicy, WeaverConfig};

/// dotweave - inject property change notification into compiled .NET setters
#[derive(Debug, Parser)]
#[command(name = "dotweave", version, about, long_about = None)]
pub struct Cli {
    /// Path to the .NET module to weave in place. Nothing happens without one.
    #[arg(value_name = "PATH", value_parser = clap::builder::ValueParser::os_string())]
    pub path: Option<OsString>,

    /// Enable verbose (debug-level) logging output.
    #[arg(short, long)]
    pub verbose: bool,

    /// Skip properties that cannot be woven instead of aborting the run.
    #[arg(long)]
    pub isolate: bool,

    /// Full name of the marker attribute type.
    #[arg(long, value_name = "NAME")]
    pub marker: Option<String>,
}

impl Cli {
    /// The module to weave, `None` for a missing or empty argument.
    pub fn target(&self) -> Option<PathBuf> {
        self.path
            .as_ref()
            .filter(|path| !path.is_empty())
            .map(PathBuf::from)
    }

    /// Maps the flags onto the weaver settings.
    pub fn config(&self) -> WeaverConfig {
        let mut config = WeaverConfig::default();
        if self.isolate {
            config.failure_policy = FailurePolicy::Isolate;
        }
        if let Some(marker) = &self.marker {
            config.marker_attribute = marker.clone();
        }
        config
    }
}
