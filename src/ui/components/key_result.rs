/// What a component did with a key: swallowed it, turned it into an event for
/// the owning view, or left it for the next handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyResult<T> {
  Handled,
  Event(T),
  NotHandled,
}
