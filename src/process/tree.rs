//! Process-tree ordering.

use std::collections::{HashMap, HashSet, VecDeque};

/// Orders the descendants of `root` so that the deepest processes come first.
///
/// `parents` yields `(pid, parent_pid)` pairs from a single process-table
/// snapshot. The root itself is not included in the result. Cycles (which a
/// snapshot taken while pids are being reused can contain) are ignored.
pub(crate) fn descendants_deepest_first<I>(root: u32, parents: I) -> Vec<u32>
where
    I: IntoIterator<Item = (u32, u32)>,
{
    let mut children: HashMap<u32, Vec<u32>> = HashMap::new();
    for (pid, parent) in parents {
        if pid != parent {
            children.entry(parent).or_default().push(pid);
        }
    }
    for kids in children.values_mut() {
        kids.sort_unstable();
    }

    let mut seen = HashSet::from([root]);
    let mut order = Vec::new();
    let mut queue = VecDeque::from([root]);
    while let Some(pid) = queue.pop_front() {
        let Some(kids) = children.get(&pid) else {
            continue;
        };
        for &kid in kids {
            if seen.insert(kid) {
                order.push(kid);
                queue.push_back(kid);
            }
        }
    }

    // Breadth-first order reversed puts leaves before their parents.
    order.reverse();
    order
}
