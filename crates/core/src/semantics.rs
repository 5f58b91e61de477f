//! Batch execution semantics
//!
//! A `Semantics` is an immutable record of seven orthogonal aspects that
//! govern how a batch is executed: atomicity, concurrency, consistency,
//! ordering, persistency, safety and security. Three templates provide
//! sensible defaults; individual aspects may be overridden while the object
//! is still mutable.
//!
//! A semantics object freezes on first share (`share()`) or on an explicit
//! `freeze()`. Setters on a frozen object are rejected, so every batch
//! observing a shared semantics sees a stable contract.

use crate::error::{Error, Result};
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::Arc;

/// Whether a batch is failure-atomic as a whole, per operation, or not at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Atomicity {
    /// The whole batch is a transaction
    Batch,
    /// Each operation is individually atomic
    Operation,
    /// No atomicity guarantees
    None,
}

/// Which concurrent accesses the caller promises to coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Concurrency {
    /// Overlapping accesses may happen
    Overlapping,
    /// Concurrent accesses never overlap
    NonOverlapping,
    /// No concurrent accesses
    None,
}

/// When other clients observe this batch's effects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Consistency {
    /// Visible once execute returns
    Immediate,
    /// Visible eventually; the batch may be cached and deferred
    Eventual,
    /// Visible to this client's session
    Session,
    /// No visibility guarantees
    None,
}

/// How strictly operation order is preserved.
///
/// Named `OrderingMode` to avoid clashing with `std::cmp::Ordering` at use
/// sites.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderingMode {
    /// Emitted order, no parallel fan-out
    Strict,
    /// Order preserved within a batch, fan-out allowed
    SemiRelaxed,
    /// Order may be rearranged freely
    Relaxed,
}

/// When data reaches durable media.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Persistency {
    /// Synced before execute returns
    Immediate,
    /// Synced eventually
    Eventual,
    /// No persistency guarantees
    None,
}

/// Which acknowledgment the client waits for on mutating operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Safety {
    /// Fire and forget
    None,
    /// Wait for the server to acknowledge receipt
    Network,
    /// Wait for the server to acknowledge storage
    Storage,
}

/// Whether credentials are attached and checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Security {
    /// Credentials attached and verified
    Strict,
    /// No security checks
    None,
}

/// Semantics templates fixing all seven aspects at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Template {
    /// Balanced defaults for general use
    Default,
    /// POSIX-like: immediate consistency, overlapping concurrency
    Posix,
    /// Everything relaxed; for scratch data
    TemporaryLocal,
}

/// An immutable bundle of seven semantic aspects.
///
/// Construct from a [`Template`], optionally adjust aspects, then [`share`]
/// it to obtain the frozen, cheaply clonable handle that batches hold.
///
/// [`share`]: Semantics::share
#[derive(Debug)]
pub struct Semantics {
    atomicity: Atomicity,
    concurrency: Concurrency,
    consistency: Consistency,
    ordering: OrderingMode,
    persistency: Persistency,
    safety: Safety,
    security: Security,
    frozen: AtomicBool,
}

/// Shared handle to a frozen semantics object.
pub type SemanticsRef = Arc<Semantics>;

impl Semantics {
    /// Create a mutable semantics object from a template.
    pub fn new(template: Template) -> Self {
        match template {
            Template::Default => Self {
                atomicity: Atomicity::Operation,
                concurrency: Concurrency::NonOverlapping,
                consistency: Consistency::Session,
                ordering: OrderingMode::SemiRelaxed,
                persistency: Persistency::None,
                safety: Safety::Network,
                security: Security::None,
                frozen: AtomicBool::new(false),
            },
            Template::Posix => Self {
                atomicity: Atomicity::Operation,
                concurrency: Concurrency::Overlapping,
                consistency: Consistency::Immediate,
                ordering: OrderingMode::SemiRelaxed,
                persistency: Persistency::Eventual,
                safety: Safety::Network,
                security: Security::Strict,
                frozen: AtomicBool::new(false),
            },
            Template::TemporaryLocal => Self {
                atomicity: Atomicity::None,
                concurrency: Concurrency::None,
                consistency: Consistency::None,
                ordering: OrderingMode::Relaxed,
                persistency: Persistency::None,
                safety: Safety::None,
                security: Security::None,
                frozen: AtomicBool::new(false),
            },
        }
    }

    /// Parse `"key=value,key=value"` aspect overrides on top of a template.
    ///
    /// Recognized keys are the aspect names (`atomicity`, `concurrency`,
    /// `consistency`, `ordering`, `persistency`, `safety`, `security`);
    /// values are the lowercase variant names (`semi-relaxed` for
    /// [`OrderingMode::SemiRelaxed`], `non-overlapping` for
    /// [`Concurrency::NonOverlapping`]).
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` on unknown keys or values.
    pub fn parse(template: Template, overrides: &str) -> Result<Self> {
        let mut semantics = Self::new(template);

        for pair in overrides.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| Error::InvalidArgument(format!("expected key=value: {pair:?}")))?;

            match key {
                "atomicity" => {
                    semantics.atomicity = match value {
                        "batch" => Atomicity::Batch,
                        "operation" => Atomicity::Operation,
                        "none" => Atomicity::None,
                        _ => return Err(bad_value(key, value)),
                    }
                }
                "concurrency" => {
                    semantics.concurrency = match value {
                        "overlapping" => Concurrency::Overlapping,
                        "non-overlapping" => Concurrency::NonOverlapping,
                        "none" => Concurrency::None,
                        _ => return Err(bad_value(key, value)),
                    }
                }
                "consistency" => {
                    semantics.consistency = match value {
                        "immediate" => Consistency::Immediate,
                        "eventual" => Consistency::Eventual,
                        "session" => Consistency::Session,
                        "none" => Consistency::None,
                        _ => return Err(bad_value(key, value)),
                    }
                }
                "ordering" => {
                    semantics.ordering = match value {
                        "strict" => OrderingMode::Strict,
                        "semi-relaxed" => OrderingMode::SemiRelaxed,
                        "relaxed" => OrderingMode::Relaxed,
                        _ => return Err(bad_value(key, value)),
                    }
                }
                "persistency" => {
                    semantics.persistency = match value {
                        "immediate" => Persistency::Immediate,
                        "eventual" => Persistency::Eventual,
                        "none" => Persistency::None,
                        _ => return Err(bad_value(key, value)),
                    }
                }
                "safety" => {
                    semantics.safety = match value {
                        "none" => Safety::None,
                        "network" => Safety::Network,
                        "storage" => Safety::Storage,
                        _ => return Err(bad_value(key, value)),
                    }
                }
                "security" => {
                    semantics.security = match value {
                        "strict" => Security::Strict,
                        "none" => Security::None,
                        _ => return Err(bad_value(key, value)),
                    }
                }
                _ => return Err(Error::InvalidArgument(format!("unknown aspect: {key:?}"))),
            }
        }

        Ok(semantics)
    }

    /// Freeze this semantics object; subsequent setters fail.
    pub fn freeze(&self) {
        self.frozen.store(true, AtomicOrdering::Release);
    }

    /// Whether the object has been frozen.
    pub fn is_frozen(&self) -> bool {
        self.frozen.load(AtomicOrdering::Acquire)
    }

    /// Freeze and wrap into the shared handle batches hold.
    pub fn share(self) -> SemanticsRef {
        self.freeze();
        Arc::new(self)
    }

    fn check_mutable(&self) -> Result<()> {
        if self.is_frozen() {
            Err(Error::InvalidArgument(
                "semantics is frozen and cannot be modified".into(),
            ))
        } else {
            Ok(())
        }
    }

    /// Set the atomicity aspect.
    ///
    /// # Errors
    ///
    /// Fails with `InvalidArgument` once the object is frozen.
    pub fn set_atomicity(&mut self, value: Atomicity) -> Result<()> {
        self.check_mutable()?;
        self.atomicity = value;
        Ok(())
    }

    /// Set the concurrency aspect. Fails once frozen.
    pub fn set_concurrency(&mut self, value: Concurrency) -> Result<()> {
        self.check_mutable()?;
        self.concurrency = value;
        Ok(())
    }

    /// Set the consistency aspect. Fails once frozen.
    pub fn set_consistency(&mut self, value: Consistency) -> Result<()> {
        self.check_mutable()?;
        self.consistency = value;
        Ok(())
    }

    /// Set the ordering aspect. Fails once frozen.
    pub fn set_ordering(&mut self, value: OrderingMode) -> Result<()> {
        self.check_mutable()?;
        self.ordering = value;
        Ok(())
    }

    /// Set the persistency aspect. Fails once frozen.
    pub fn set_persistency(&mut self, value: Persistency) -> Result<()> {
        self.check_mutable()?;
        self.persistency = value;
        Ok(())
    }

    /// Set the safety aspect. Fails once frozen.
    pub fn set_safety(&mut self, value: Safety) -> Result<()> {
        self.check_mutable()?;
        self.safety = value;
        Ok(())
    }

    /// Set the security aspect. Fails once frozen.
    pub fn set_security(&mut self, value: Security) -> Result<()> {
        self.check_mutable()?;
        self.security = value;
        Ok(())
    }

    /// The atomicity aspect.
    pub fn atomicity(&self) -> Atomicity {
        self.atomicity
    }

    /// The concurrency aspect.
    pub fn concurrency(&self) -> Concurrency {
        self.concurrency
    }

    /// The consistency aspect.
    pub fn consistency(&self) -> Consistency {
        self.consistency
    }

    /// The ordering aspect.
    pub fn ordering(&self) -> OrderingMode {
        self.ordering
    }

    /// The persistency aspect.
    pub fn persistency(&self) -> Persistency {
        self.persistency
    }

    /// The safety aspect.
    pub fn safety(&self) -> Safety {
        self.safety
    }

    /// The security aspect.
    pub fn security(&self) -> Security {
        self.security
    }
}

impl Default for Semantics {
    fn default() -> Self {
        Self::new(Template::Default)
    }
}

fn bad_value(key: &str, value: &str) -> Error {
    Error::InvalidArgument(format!("invalid value for {key}: {value:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_defaults() {
        let s = Semantics::new(Template::Default);
        assert_eq!(s.concurrency(), Concurrency::NonOverlapping);
        assert_eq!(s.consistency(), Consistency::Session);
        assert_eq!(s.ordering(), OrderingMode::SemiRelaxed);
        assert_eq!(s.persistency(), Persistency::None);
        assert_eq!(s.safety(), Safety::Network);
        assert_eq!(s.security(), Security::None);

        let p = Semantics::new(Template::Posix);
        assert_eq!(p.concurrency(), Concurrency::Overlapping);
        assert_eq!(p.consistency(), Consistency::Immediate);
        assert_eq!(p.persistency(), Persistency::Eventual);
        assert_eq!(p.security(), Security::Strict);

        let t = Semantics::new(Template::TemporaryLocal);
        assert_eq!(t.atomicity(), Atomicity::None);
        assert_eq!(t.safety(), Safety::None);
        assert_eq!(t.ordering(), OrderingMode::Relaxed);
    }

    #[test]
    fn parse_overrides() {
        let s = Semantics::parse(
            Template::Default,
            "consistency=eventual, safety=storage,ordering=strict",
        )
        .unwrap();
        assert_eq!(s.consistency(), Consistency::Eventual);
        assert_eq!(s.safety(), Safety::Storage);
        assert_eq!(s.ordering(), OrderingMode::Strict);
        // untouched aspects keep template values
        assert_eq!(s.concurrency(), Concurrency::NonOverlapping);

        assert!(Semantics::parse(Template::Default, "atomicity=full").is_err());
        assert!(Semantics::parse(Template::Default, "colour=red").is_err());
        assert!(Semantics::parse(Template::Default, "safety").is_err());
    }

    #[test]
    fn setters_fail_after_freeze() {
        let mut s = Semantics::new(Template::Default);
        s.set_persistency(Persistency::Immediate).unwrap();
        s.freeze();
        assert!(s.set_persistency(Persistency::None).is_err());
        assert!(s.set_safety(Safety::None).is_err());
        assert_eq!(s.persistency(), Persistency::Immediate);
    }

    #[test]
    fn share_freezes() {
        let s = Semantics::new(Template::Default);
        let shared = s.share();
        assert!(shared.is_frozen());
    }
}
