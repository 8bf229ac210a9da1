//! Client policy declaration.

use std::fmt::Debug;
use std::hash::Hash;

/// Static declaration of a machine's vocabulary.
///
/// A client implements `Policy` once per machine definition, naming the
/// state-identifier type, the event-kind type and the event value type.
/// The declaration is pure configuration: it carries no runtime state.
///
/// # Event shape
///
/// `Event` is a tagged variant over `Kind`: clients declare an enum whose
/// variants are the event kinds, each carrying that kind's payload (or
/// nothing). A kind-`K` event can only be built through the variant
/// constructor that takes `K`'s payload, so a mismatched payload is
/// unrepresentable. `Kind` is the payload-free discriminant enum used to
/// key the transition table.
///
/// # Example
///
/// ```
/// use canopy_core::Policy;
///
/// #[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
/// enum DoorState { Open, Closed }
///
/// #[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
/// enum DoorKind { Push, Slam }
///
/// #[derive(Debug)]
/// enum DoorEvent {
///     Push,
///     Slam { force: u32 },
/// }
///
/// struct Door;
///
/// impl Policy for Door {
///     type StateId = DoorState;
///     type Kind = DoorKind;
///     type Event = DoorEvent;
///
///     fn kind_of(event: &DoorEvent) -> DoorKind {
///         match event {
///             DoorEvent::Push => DoorKind::Push,
///             DoorEvent::Slam { .. } => DoorKind::Slam,
///         }
///     }
///
///     fn state_name(id: DoorState) -> &'static str {
///         match id {
///             DoorState::Open => "Open",
///             DoorState::Closed => "Closed",
///         }
///     }
///
///     fn kind_name(kind: DoorKind) -> &'static str {
///         match kind {
///             DoorKind::Push => "Push",
///             DoorKind::Slam => "Slam",
///         }
///     }
/// }
/// ```
pub trait Policy: Sized + Send + 'static {
    /// State identifier. Clients typically use a fieldless enum.
    type StateId: Copy + Eq + Hash + Debug + Send + 'static;

    /// Event kind tag: the payload-free discriminant of [`Policy::Event`].
    type Kind: Copy + Eq + Hash + Debug + Send + 'static;

    /// Event value: a tagged variant carrying per-kind payloads.
    type Event: Send + 'static;

    /// The kind of an event value.
    fn kind_of(event: &Self::Event) -> Self::Kind;

    /// Display name of a state for logs.
    fn state_name(id: Self::StateId) -> &'static str;

    /// Display name of an event kind for logs.
    fn kind_name(kind: Self::Kind) -> &'static str;
}
