//! Factor patterns: the cache key of a factor graph.

use std::fmt;
use std::sync::Arc;

/// Stable identifier of a template. Patterns hold this instead of a pointer
/// back to the template.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TemplateId(Arc<str>);

impl TemplateId {
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(Arc::from(name.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TemplateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TemplateId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Identity (and, where it matters, value) of one state variable a factor
/// depends on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Variable {
    /// Position in the instance, e.g. a token index.
    Index(usize),
    /// Any integer-valued identity.
    Int(i64),
    /// Symbolic value, e.g. a label or entity type.
    Symbol(Arc<str>),
}

impl From<usize> for Variable {
    fn from(i: usize) -> Self {
        Variable::Index(i)
    }
}

impl From<i64> for Variable {
    fn from(i: i64) -> Self {
        Variable::Int(i)
    }
}

impl From<&str> for Variable {
    fn from(s: &str) -> Self {
        Variable::Symbol(Arc::from(s))
    }
}

impl From<String> for Variable {
    fn from(s: String) -> Self {
        Variable::Symbol(Arc::from(s))
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Variable::Index(i) => write!(f, "#{i}"),
            Variable::Int(i) => write!(f, "{i}"),
            Variable::Symbol(s) => write!(f, "{s:?}"),
        }
    }
}

/// Which template, applied to which variables.
///
/// Equality and hashing are structural, so two patterns generated
/// independently for the same template and variables hit the same cache slot.
/// Patterns carry no computed values.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FactorPattern {
    template: TemplateId,
    variables: Vec<Variable>,
}

impl FactorPattern {
    /// Pattern whose variable order is significant (e.g. a transition `a -> b`).
    pub fn ordered<V, It>(template: &TemplateId, variables: It) -> Self
    where
        V: Into<Variable>,
        It: IntoIterator<Item = V>,
    {
        Self {
            template: template.clone(),
            variables: variables.into_iter().map(Into::into).collect(),
        }
    }

    /// Pattern over a variable set: order is canonicalized so any permutation
    /// produces the same key.
    pub fn unordered<V, It>(template: &TemplateId, variables: It) -> Self
    where
        V: Into<Variable>,
        It: IntoIterator<Item = V>,
    {
        let mut pattern = Self::ordered(template, variables);
        pattern.variables.sort();
        pattern
    }

    pub fn template(&self) -> &TemplateId {
        &self.template
    }

    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }
}

impl fmt::Display for FactorPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.template)?;
        for (i, v) in self.variables.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{v}")?;
        }
        write!(f, ")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_structural_equality() {
        let t = TemplateId::new("emission");
        let a = FactorPattern::ordered(&t, [Variable::from(3usize), Variable::from("PER")]);
        let b = FactorPattern::ordered(&TemplateId::new("emission"), [Variable::Index(3), "PER".into()]);
        assert_eq!(a, b);
        let set: HashSet<_> = [a, b].into_iter().collect();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_template_identity_is_part_of_key() {
        let a = FactorPattern::ordered(&TemplateId::new("a"), [1usize]);
        let b = FactorPattern::ordered(&TemplateId::new("b"), [1usize]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_ordered_vs_unordered() {
        let t = TemplateId::new("pair");
        let ab = FactorPattern::ordered(&t, [1usize, 2]);
        let ba = FactorPattern::ordered(&t, [2usize, 1]);
        assert_ne!(ab, ba);
        let uab = FactorPattern::unordered(&t, [1usize, 2]);
        let uba = FactorPattern::unordered(&t, [2usize, 1]);
        assert_eq!(uab, uba);
    }

    #[test]
    fn test_display() {
        let t = TemplateId::new("emission");
        let p = FactorPattern::ordered(&t, [Variable::Index(0), "O".into(), Variable::Int(-2)]);
        assert_eq!(p.to_string(), "emission(#0, \"O\", -2)");
    }
}
