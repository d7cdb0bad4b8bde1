//! Resource categories and the set of categories enabled for a run.
use std::fmt;

use crate::error::ConfigError;

/// A resource category handled by one handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Category {
    /// Child sites.
    Subsites,
    /// Site columns.
    Fields,
    /// Lists and libraries.
    Lists,
    /// Rows inside lists.
    ListItems,
    /// Navigation nodes.
    Navigation,
    /// Site property bag values.
    PropertyBag,
}

impl Category {
    /// Every category, in handler order.
    pub const ALL: [Self; 6] = [
        Self::Subsites,
        Self::Fields,
        Self::Lists,
        Self::ListItems,
        Self::Navigation,
        Self::PropertyBag,
    ];

    /// The tag used in templates, config files and on the command line.
    #[must_use]
    pub const fn tag(self) -> &'static str {
        match self {
            Self::Subsites => "subsites",
            Self::Fields => "fields",
            Self::Lists => "lists",
            Self::ListItems => "list-items",
            Self::Navigation => "navigation",
            Self::PropertyBag => "property-bag",
        }
    }

    /// Parse a tag, case-insensitively.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownCategory`] for an unrecognised tag.
    ///
    /// # Examples
    ///
    /// ```
    /// use provisioner::config::category::Category;
    ///
    /// assert_eq!(Category::from_tag("List-Items").unwrap(), Category::ListItems);
    /// assert!(Category::from_tag("themes").is_err());
    /// ```
    pub fn from_tag(tag: &str) -> Result<Self, ConfigError> {
        Self::ALL
            .into_iter()
            .find(|c| c.tag().eq_ignore_ascii_case(tag.trim()))
            .ok_or_else(|| ConfigError::UnknownCategory(tag.to_string()))
    }

    const fn bit(self) -> u32 {
        1 << self as u32
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Set of enabled categories.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct CategorySet(u32);

impl CategorySet {
    /// Every category enabled.
    #[must_use]
    pub const fn all() -> Self {
        Self(
            Category::Subsites.bit()
                | Category::Fields.bit()
                | Category::Lists.bit()
                | Category::ListItems.bit()
                | Category::Navigation.bit()
                | Category::PropertyBag.bit(),
        )
    }

    /// No category enabled.
    #[must_use]
    pub const fn none() -> Self {
        Self(0)
    }

    /// This set plus `category`.
    #[must_use]
    pub const fn with(self, category: Category) -> Self {
        Self(self.0 | category.bit())
    }

    /// This set minus `category`.
    #[must_use]
    pub const fn without(self, category: Category) -> Self {
        Self(self.0 & !category.bit())
    }

    /// Returns `true` if `category` is enabled.
    #[must_use]
    pub const fn contains(self, category: Category) -> bool {
        self.0 & category.bit() != 0
    }

    /// Returns `true` if no category is enabled.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// The enabled categories, in handler order.
    pub fn iter(self) -> impl Iterator<Item = Category> {
        Category::ALL.into_iter().filter(move |c| self.contains(*c))
    }
}

impl Default for CategorySet {
    fn default() -> Self {
        Self::all()
    }
}

impl FromIterator<Category> for CategorySet {
    fn from_iter<I: IntoIterator<Item = Category>>(iter: I) -> Self {
        iter.into_iter().fold(Self::none(), Self::with)
    }
}

impl fmt::Debug for CategorySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter().map(Category::tag)).finish()
    }
}
