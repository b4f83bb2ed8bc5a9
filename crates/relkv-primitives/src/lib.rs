#[macro_use]
mod macros;

///
/// HandlerKind
///
/// Canonical field-handler kind used for persisted type tags and shared
/// capability metadata.
///

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum HandlerKind {
    Bool,
    Int,
    Uint,
    Float64,
    Text,
    Blob,
    Enum,
    Optional,
    List,
    Dictionary,
    Object,
}

impl HandlerKind {
    /// Return the full metadata descriptor for one handler kind.
    #[must_use]
    pub const fn metadata(self) -> HandlerMetadata {
        handler_kind_registry!(metadata_from_registry, self)
    }

    /// Resolve a persisted type tag back into its handler kind.
    #[must_use]
    pub const fn from_tag(tag: u8) -> Option<Self> {
        handler_kind_registry!(kind_from_tag_registry, tag)
    }

    /// Return the persisted type tag for this kind.
    #[must_use]
    pub const fn tag(self) -> u8 {
        self.metadata().tag
    }

    /// Return whether encoded bytes of this kind sort like its values.
    ///
    /// Composite kinds only qualify when their inner kinds do too.
    #[must_use]
    pub const fn is_orderable(self) -> bool {
        self.metadata().is_orderable
    }

    /// Return whether this kind participates in per-pass codec context.
    #[must_use]
    pub const fn needs_context(self) -> bool {
        self.metadata().needs_context
    }

    /// Return whether values of this kind can own nested content.
    #[must_use]
    pub const fn may_free_content(self) -> bool {
        self.metadata().may_free_content
    }

    /// Return whether this kind wraps other kinds.
    #[must_use]
    pub const fn is_composite(self) -> bool {
        self.metadata().is_composite
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Uint => "uint",
            Self::Float64 => "float64",
            Self::Text => "text",
            Self::Blob => "blob",
            Self::Enum => "enum",
            Self::Optional => "optional",
            Self::List => "list",
            Self::Dictionary => "dictionary",
            Self::Object => "object",
        }
    }
}

///
/// HandlerMetadata
///
/// Capability metadata shared by the schema and codec layers.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[allow(clippy::struct_excessive_bools)]
pub struct HandlerMetadata {
    pub tag: u8,
    pub is_orderable: bool,
    pub needs_context: bool,
    pub may_free_content: bool,
    pub is_composite: bool,
}

/// Ordered list of all handler kinds in registry order.
pub const ALL_HANDLER_KINDS: [HandlerKind; 11] = handler_kind_registry!(all_kinds_from_registry);

///
/// TESTS
///
