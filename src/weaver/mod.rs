//! Property change notification weaving.
//!
//! The [`Weaver`] drives one pass over a module: it scans for marked properties, resolves
//! a comparer for each, synthesizes the notifying setter and strips the marker. Failures
//! either abort the pass or are collected per property, depending on the configured
//! [`FailurePolicy`].
//!
//! # Examples
//!
//! ```rust,no_run
//! use dotweave::{Weaver, WeaverConfig};
//! use std::path::Path;
//!
//! let report = Weaver::new(WeaverConfig::default()).weave_file(Path::new("ViewModels.dll"))?;
//! for property in &report.woven {
//!     println!("woven: {property}");
//! }
//! # Ok::<(), dotweave::Error>(())
//! ```

pub mod comparer;
pub mod scanner;
pub mod stripper;
pub mod synthesizer;

use std::path::Path;

use crate::{cilassembly::CilAssembly, Error, Result};

use scanner::{marker_constructors, CandidateSet};

/// Default full name of the marker attribute.
pub const DEFAULT_MARKER: &str = "Engine.Wpf.NotifyPropertyChangedAttribute";
/// Default backing field naming pattern, `{name}` is replaced by the property name.
pub const DEFAULT_BACKING_FIELD: &str = "<{name}>k__BackingField";
/// Default name of the notification handler field.
pub const DEFAULT_HANDLER_FIELD: &str = "PropertyChanged";

/// What happens when a property cannot be woven.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// The first failure ends the pass; nothing is written
    #[default]
    Abort,
    /// Failing properties keep their marker and are reported, the rest is woven
    Isolate,
}

/// Weaver settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeaverConfig {
    /// Full name of the marker attribute type
    pub marker_attribute: String,
    /// Backing field naming pattern
    pub backing_field_pattern: String,
    /// Name of the `PropertyChangedEventHandler` field
    pub handler_field: String,
    /// Failure handling
    pub failure_policy: FailurePolicy,
    /// Regenerate the Portable PDB next to the module
    pub write_symbols: bool,
}

impl Default for WeaverConfig {
    fn default() -> Self {
        WeaverConfig {
            marker_attribute: DEFAULT_MARKER.to_string(),
            backing_field_pattern: DEFAULT_BACKING_FIELD.to_string(),
            handler_field: DEFAULT_HANDLER_FIELD.to_string(),
            failure_policy: FailurePolicy::Abort,
            write_symbols: true,
        }
    }
}

impl WeaverConfig {
    /// The defaults with [`FailurePolicy::Isolate`].
    #[must_use]
    pub fn isolating() -> Self {
        WeaverConfig {
            failure_policy: FailurePolicy::Isolate,
            ..Self::default()
        }
    }

    /// The backing field name of `property`.
    #[must_use]
    pub fn backing_field_name(&self, property: &str) -> String {
        self.backing_field_pattern.replace("{name}", property)
    }
}

/// A property that could not be woven under [`FailurePolicy::Isolate`].
#[derive(Debug)]
pub struct WeaveFailure {
    /// `Type::Property`
    pub property: String,
    /// Why
    pub error: Error,
}

/// Outcome of a pass.
#[derive(Debug, Default)]
pub struct WeaveReport {
    /// Woven properties as `Type::Property`, in declaration order
    pub woven: Vec<String>,
    /// Properties left untouched
    pub failures: Vec<WeaveFailure>,
}

impl WeaveReport {
    /// `true` if at least one setter was rewritten.
    #[must_use]
    pub fn has_changes(&self) -> bool {
        !self.woven.is_empty()
    }
}

/// Weaves property change notification into modules.
#[derive(Debug, Clone, Default)]
pub struct Weaver {
    config: WeaverConfig,
}

impl Weaver {
    /// Creates a weaver.
    #[must_use]
    pub fn new(config: WeaverConfig) -> Self {
        Weaver { config }
    }

    /// The settings in use.
    #[must_use]
    pub fn config(&self) -> &WeaverConfig {
        &self.config
    }

    /// Weaves all marked properties of `assembly` in memory.
    ///
    /// # Errors
    /// Under [`FailurePolicy::Abort`], the first property error. Format errors of the
    /// module itself are returned under both policies.
    pub fn weave(&self, assembly: &mut CilAssembly) -> Result<WeaveReport> {
        let candidates = CandidateSet::scan(assembly, &self.config.marker_attribute)?;
        let mut report = WeaveReport::default();
        if candidates.is_empty() {
            log::info!("No properties marked with {}", self.config.marker_attribute);
            return Ok(report);
        }

        let constructors = marker_constructors(assembly, &self.config.marker_attribute)?;
        for candidate in candidates {
            let property = candidate.display_name();
            log::info!("Injecting in {property}");

            match synthesizer::synthesize(assembly, &candidate, &self.config) {
                Ok(()) => {
                    stripper::strip_markers(assembly, candidate.property, &constructors)?;
                    report.woven.push(property);
                }
                Err(error) => match self.config.failure_policy {
                    FailurePolicy::Abort => return Err(error),
                    FailurePolicy::Isolate => {
                        log::warn!("Skipping {property}: {error}");
                        report.failures.push(WeaveFailure { property, error });
                    }
                },
            }
        }

        Ok(report)
    }

    /// Loads the module at `path`, weaves it and writes it back in place together with
    /// its symbols. Nothing is written when no property was woven.
    ///
    /// # Errors
    /// [`crate::Error::Load`] and [`crate::Error::Write`] for I/O and format problems, and
    /// the errors of [`Weaver::weave`].
    pub fn weave_file(&self, path: &Path) -> Result<WeaveReport> {
        log::info!("start code weaving");
        let result = self.weave_path(path);
        match &result {
            Ok(_) => log::info!("code weaving finished"),
            Err(_) => log::error!("code weaving failed"),
        }
        result
    }

    fn weave_path(&self, path: &Path) -> Result<WeaveReport> {
        let mut assembly = CilAssembly::load(path)?;
        if !self.config.write_symbols && assembly.take_symbols().is_some() {
            log::debug!("Symbols of {} are left as they are", path.display());
        }

        let report = self.weave(&mut assembly)?;
        if report.has_changes() {
            log::info!("writing to assembly");
            assembly.save(path)?;
        }
        Ok(report)
    }
}
