//! Group hierarchy reconstruction from path strings.
//!
//! Groups are processed shallowest first, so every parent path has been seen before any of its
//! children. A non-root group gets one `CHILD_OF` edge to the group owning its parent path.

use crate::error::{Issue, IssueKind};
use crate::graph::{EdgeRecord, EdgeType, NodeLabel, NodeRecord, NodeRef};
use crate::normalize::split_group_path;
use crate::resolve::edges::EdgeSet;
use std::collections::HashMap;

struct GroupEntry {
    segments: Vec<String>,
    path: String,
    node: NodeRef,
}

/// Emit `CHILD_OF` edges for the groups among `nodes`.
///
/// - a missing parent path is reported as `OrphanGroup`; the node stays in the graph
/// - a path owned by two groups is reported as `DuplicateGroupPath`; both stay, and the
///   children of that path are reported as orphans rather than attached to either
pub fn resolve_groups(nodes: &[NodeRecord], edges: &mut EdgeSet, issues: &mut Vec<Issue>) {
    let mut groups: Vec<GroupEntry> = nodes
        .iter()
        .filter(|n| n.label == NodeLabel::Group)
        .map(|n| {
            let path = n.properties.get_str("path").unwrap_or_default().to_string();
            GroupEntry {
                segments: split_group_path(&path),
                path,
                node: n.node_ref(),
            }
        })
        .collect();

    groups.sort_by(|a, b| {
        a.segments
            .len()
            .cmp(&b.segments.len())
            .then_with(|| a.path.cmp(&b.path))
            .then_with(|| a.node.key.cmp(&b.node.key))
    });

    // path segments → owning group, or None once the path is known to be ambiguous
    let mut built: HashMap<Vec<String>, Option<NodeRef>> = HashMap::new();

    for group in groups {
        if group.segments.is_empty() {
            issues.push(Issue::new(
                IssueKind::OrphanGroup,
                format!("group {} has no usable path '{}'", group.node, group.path),
            ));
            continue;
        }

        match built.get_mut(&group.segments) {
            Some(owner) => {
                issues.push(Issue::new(
                    IssueKind::DuplicateGroupPath,
                    format!("path '{}' is claimed by more than one group ({})", group.path, group.node),
                ));
                *owner = None;
            }
            None => {
                built.insert(group.segments.clone(), Some(group.node.clone()));
            }
        }

        if group.segments.len() == 1 {
            continue;
        }

        let parent_segments = &group.segments[..group.segments.len() - 1];
        match built.get(parent_segments) {
            Some(Some(parent)) => {
                edges.insert(EdgeRecord::new(
                    EdgeType::ChildOf,
                    group.node.clone(),
                    parent.clone(),
                ));
            }
            Some(None) => issues.push(Issue::new(
                IssueKind::OrphanGroup,
                format!(
                    "group {} at '{}' has an ambiguous parent path",
                    group.node, group.path
                ),
            )),
            None => issues.push(Issue::new(
                IssueKind::OrphanGroup,
                format!("group {} at '{}' has no parent group", group.node, group.path),
            )),
        }
    }
}
