use crate::snapshot::ListSnapshot;

/// Consumer of snapshots. Rendering must not depend on how often it is
/// called: the same snapshot may be rendered more than once.
pub trait Presenter: Send + Sync + 'static {
    fn render(&self, snapshot: &ListSnapshot);
}
