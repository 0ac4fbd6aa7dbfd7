use tactus_domain::{is_assignable, Component, Leaf, Voice};

/// Rewrites a freshly notated voice for cleaner engraving. Optimizers only
/// regroup leaves; the voice's sounding duration never changes.
pub trait AttackPointOptimizer: Send + Sync {
    fn optimize(&self, voice: &mut Voice);
}

/// Fuses each tied leaf with its sibling continuation whenever the pair can
/// be written as a single note value.
#[derive(Clone, Copy, Debug, Default)]
pub struct NaiveAttackPointOptimizer;

impl AttackPointOptimizer for NaiveAttackPointOptimizer {
    fn optimize(&self, voice: &mut Voice) {
        fuse_ties(&mut voice.components);
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct NullAttackPointOptimizer;

impl AttackPointOptimizer for NullAttackPointOptimizer {
    fn optimize(&self, _voice: &mut Voice) {}
}

fn fuse_ties(components: &mut Vec<Component>) {
    let mut fused: Vec<Component> = Vec::with_capacity(components.len());
    for mut component in components.drain(..) {
        if let Component::Tuplet(tuplet) = &mut component {
            fuse_ties(&mut tuplet.components);
        }
        if let (Some(Component::Leaf(previous)), Component::Leaf(next)) =
            (fused.last_mut(), &component)
        {
            if can_fuse(previous, next) {
                previous.written_duration += next.written_duration;
                previous.tied = next.tied;
                continue;
            }
        }
        fused.push(component);
    }
    *components = fused;
}

fn can_fuse(previous: &Leaf, next: &Leaf) -> bool {
    previous.tied
        && previous.kind == next.kind
        && next.grace.is_none()
        && next.tempo.is_none()
        && next.attachments.is_empty()
        && is_assignable(previous.written_duration + next.written_duration)
}
