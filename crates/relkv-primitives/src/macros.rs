#[macro_export]
macro_rules! handler_kind_registry_entries {
    ($macro:ident $(, @args $($args:tt)+ )?) => {
        $macro! {
            $(
                @args $($args)+;
            )?
            @entries
            (
                Bool,
                tag = 1,
                is_orderable = true,
                needs_context = false,
                may_free_content = false,
                is_composite = false
            ),
            (
                Int,
                tag = 2,
                is_orderable = true,
                needs_context = false,
                may_free_content = false,
                is_composite = false
            ),
            (
                Uint,
                tag = 3,
                is_orderable = true,
                needs_context = false,
                may_free_content = false,
                is_composite = false
            ),
            (
                Float64,
                tag = 4,
                is_orderable = true,
                needs_context = false,
                may_free_content = false,
                is_composite = false
            ),
            (
                Text,
                tag = 5,
                is_orderable = true,
                needs_context = false,
                may_free_content = false,
                is_composite = false
            ),
            (
                Blob,
                tag = 6,
                is_orderable = false,
                needs_context = false,
                may_free_content = false,
                is_composite = false
            ),
            (
                Enum,
                tag = 7,
                is_orderable = true,
                needs_context = false,
                may_free_content = false,
                is_composite = false
            ),
            (
                Optional,
                tag = 8,
                is_orderable = true,
                needs_context = false,
                may_free_content = false,
                is_composite = true
            ),
            (
                List,
                tag = 9,
                is_orderable = false,
                needs_context = false,
                may_free_content = false,
                is_composite = true
            ),
            (
                Dictionary,
                tag = 10,
                is_orderable = false,
                needs_context = true,
                may_free_content = true,
                is_composite = false
            ),
            (
                Object,
                tag = 11,
                is_orderable = false,
                needs_context = true,
                may_free_content = false,
                is_composite = true
            ),
        }
    };
}

macro_rules! handler_kind_registry {
    ($macro:ident) => {
        $crate::handler_kind_registry_entries!($macro)
    };
    ($macro:ident, $($args:tt)+) => {
        $crate::handler_kind_registry_entries!($macro, @args $($args)+)
    };
}

macro_rules! metadata_from_registry {
    ( @args $kind:expr; @entries $( ($handler:ident, tag = $tag:literal, is_orderable = $is_orderable:expr, needs_context = $needs_context:expr, may_free_content = $may_free_content:expr, is_composite = $is_composite:expr) ),* $(,)? ) => {
        match $kind {
            $(
                $crate::HandlerKind::$handler => $crate::HandlerMetadata {
                    tag: $tag,
                    is_orderable: $is_orderable,
                    needs_context: $needs_context,
                    may_free_content: $may_free_content,
                    is_composite: $is_composite,
                },
            )*
        }
    };
}

macro_rules! kind_from_tag_registry {
    ( @args $tag_value:expr; @entries $( ($handler:ident, tag = $tag:literal, is_orderable = $is_orderable:expr, needs_context = $needs_context:expr, may_free_content = $may_free_content:expr, is_composite = $is_composite:expr) ),* $(,)? ) => {
        match $tag_value {
            $(
                $tag => Some($crate::HandlerKind::$handler),
            )*
            _ => None,
        }
    };
}

macro_rules! all_kinds_from_registry {
    ( @entries $( ($handler:ident, tag = $tag:literal, is_orderable = $is_orderable:expr, needs_context = $needs_context:expr, may_free_content = $may_free_content:expr, is_composite = $is_composite:expr) ),* $(,)? ) => {
        [ $( $crate::HandlerKind::$handler ),* ]
    };
}
