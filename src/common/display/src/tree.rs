//! Tree rendering for propagation plans.

use std::fmt;

/// An owned tree of labelled lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextTree {
    label: String,
    detail: Option<String>,
    children: Vec<TextTree>,
}

impl TextTree {
    /// Create a leaf.
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            detail: None,
            children: Vec::new(),
        }
    }

    /// Attach a detail shown in parentheses after the label.
    #[must_use]
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// Append a child.
    pub fn push(&mut self, child: TextTree) {
        self.children.push(child);
    }

    /// Label of this node.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Children of this node.
    pub fn children(&self) -> &[TextTree] {
        &self.children
    }

    /// Mutable access to a child by position.
    pub fn child_mut(&mut self, index: usize) -> Option<&mut TextTree> {
        self.children.get_mut(index)
    }

    fn fmt_line(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label)?;
        if let Some(detail) = &self.detail {
            write!(f, " ({detail})")?;
        }
        writeln!(f)
    }

    fn fmt_children(&self, f: &mut fmt::Formatter<'_>, prefix: &str) -> fmt::Result {
        for (i, child) in self.children.iter().enumerate() {
            let is_last = i + 1 == self.children.len();
            let connector = if is_last { "└─ " } else { "├─ " };
            write!(f, "{prefix}{connector}")?;
            child.fmt_line(f)?;
            let child_prefix = format!("{prefix}{}", if is_last { "   " } else { "│  " });
            child.fmt_children(f, &child_prefix)?;
        }
        Ok(())
    }
}

impl fmt::Display for TextTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_line(f)?;
        self.fmt_children(f, "")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_tree() {
        let mut root = TextTree::new("Supplier");
        let mut catalog = TextTree::new("Catalog").with_detail("via s_id");
        catalog.push(TextTree::new("Part").with_detail("via p_id"));
        root.push(catalog);
        root.push(TextTree::new("Region"));

        let output = root.to_string();
        assert_eq!(
            output,
            "Supplier\n├─ Catalog (via s_id)\n│  └─ Part (via p_id)\n└─ Region\n"
        );
    }

    #[test]
    fn test_child_mut() {
        let mut root = TextTree::new("root");
        root.push(TextTree::new("a"));
        root.child_mut(0).unwrap().push(TextTree::new("b"));
        assert_eq!(root.children()[0].children()[0].label(), "b");
    }
}
