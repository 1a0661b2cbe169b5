// ABOUTME: Sealed trait pattern for runtime-internal traits.
// ABOUTME: Prevents external implementations of the raw exec capability.

/// Sealed trait to prevent external implementations.
///
/// Only runtime types inside this crate can run raw commands in containers;
/// everything else goes through the store and service collaborators.
pub trait Sealed {}
