use nodepack_core::{PackInstance, VersionKind};

/// Highest release among `instances`; on a tie the earliest instance wins.
pub fn highest_release<'a, I>(instances: I) -> Option<&'a PackInstance>
where
    I: IntoIterator<Item = &'a PackInstance>,
{
    let mut best: Option<&PackInstance> = None;
    for instance in instances {
        let Some(version) = instance.version.release() else {
            continue;
        };
        let replaces = match best.and_then(|current| current.version.release()) {
            Some(current) => version > current,
            None => true,
        };
        if replaces {
            best = Some(instance);
        }
    }
    best
}

pub fn select_active(instances: &[PackInstance]) -> Option<&PackInstance> {
    instances.iter().find(|instance| instance.active)
}

/// Disabled instance to bring back. A wanted kind must match exactly;
/// without one the order is highest release, nightly, unknown.
pub fn select_inactive<'a>(
    instances: &'a [PackInstance],
    wanted: Option<&VersionKind>,
) -> Option<&'a PackInstance> {
    let inactive = || instances.iter().filter(|instance| !instance.active);
    if let Some(wanted) = wanted {
        if let Some(exact) = inactive().find(|instance| &instance.version == wanted) {
            return Some(exact);
        }
        return None;
    }
    fallback(inactive())
}

/// Instance that represents a pack in listings: the active one, else the
/// preferred inactive one.
pub fn select_preferred(instances: &[PackInstance]) -> Option<&PackInstance> {
    select_active(instances).or_else(|| select_inactive(instances, None))
}

fn fallback<'a, I>(instances: I) -> Option<&'a PackInstance>
where
    I: Iterator<Item = &'a PackInstance> + Clone,
{
    highest_release(instances.clone())
        .or_else(|| instances.clone().find(|instance| instance.is_nightly()))
        .or_else(|| instances.clone().find(|instance| instance.is_unknown()))
}
