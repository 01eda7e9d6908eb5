use super::{FieldConfig, MappingNode, MappingSpec};

/// Resolves a SCIM attribute path to its leaf configuration.
///
/// An exact (possibly dotted) key wins; otherwise the path is walked segment
/// by segment and the first leaf reached is returned. Names are matched
/// exactly.
pub fn find_leaf<'a>(property: &str, spec: &'a MappingSpec) -> Option<&'a FieldConfig> {
    if let Some(node) = spec.get(property) {
        return match node {
            MappingNode::Leaf(config) => Some(config),
            MappingNode::Group(_) => None,
        };
    }

    for (idx, _) in property.match_indices('.') {
        let (head, rest) = (&property[..idx], &property[idx + 1..]);
        match spec.get(head) {
            Some(MappingNode::Leaf(config)) => return Some(config),
            Some(MappingNode::Group(inner)) => {
                if let Some(found) = find_leaf(rest, inner) {
                    return Some(found);
                }
            }
            None => {}
        }
    }
    None
}

/// Storage column behind a SCIM attribute path, if it is mapped on one.
pub fn find_field<'a>(property: &str, spec: &'a MappingSpec) -> Option<&'a str> {
    find_leaf(property, spec).and_then(|config| config.map_on.as_deref())
}

/// Reverse lookup: the dotted SCIM path whose leaf is mapped on `field`.
pub fn find_property(field: &str, spec: &MappingSpec) -> Option<String> {
    for (key, node) in spec.entries() {
        match node {
            MappingNode::Leaf(config) if config.map_on.as_deref() == Some(field) => {
                return Some(key.to_string())
            }
            MappingNode::Leaf(_) => {}
            MappingNode::Group(inner) => {
                if let Some(rest) = find_property(field, inner) {
                    return Some(format!("{key}.{rest}"));
                }
            }
        }
    }
    None
}
