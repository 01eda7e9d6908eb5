use crate::utils::split_comma_list;

/// `attributes` / `excludedAttributes` selection (RFC 7644 section 3.4.2.5)
/// applied to mapping keys.
///
/// A leaf is addressed by its full dotted path or by any dotted prefix of it,
/// so `name` selects `name.givenName`. Names are matched exactly.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttributeSelection {
    pub attributes: Option<Vec<String>>,
    pub excluded_attributes: Option<Vec<String>>,
}

impl AttributeSelection {
    /// Everything is selected.
    pub fn all() -> Self {
        Self::default()
    }

    /// Parse attributes and excludedAttributes query parameters
    pub fn from_params(attributes: Option<&str>, excluded_attributes: Option<&str>) -> Self {
        Self {
            attributes: attributes.map(split_comma_list).filter(|list| !list.is_empty()),
            excluded_attributes: excluded_attributes
                .map(split_comma_list)
                .filter(|list| !list.is_empty()),
        }
    }

    pub fn only<I, S>(attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            attributes: Some(attributes.into_iter().map(Into::into).collect()),
            excluded_attributes: None,
        }
    }

    pub fn is_selected(&self, path: &str) -> bool {
        if let Some(attributes) = &self.attributes {
            if !attributes.iter().any(|attr| addresses(attr, path)) {
                return false;
            }
        }
        if let Some(excluded) = &self.excluded_attributes {
            if excluded.iter().any(|attr| addresses(attr, path)) {
                return false;
            }
        }
        true
    }
}

fn addresses(attr: &str, path: &str) -> bool {
    path == attr
        || (path.starts_with(attr) && path.as_bytes().get(attr.len()) == Some(&b'.'))
}
