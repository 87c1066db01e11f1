//! Helper macro for generating port error enums with snake_case constructors.

macro_rules! define_port_error {
    (@ctor $variant:ident) => {
        ::paste::paste! {
            pub fn [<$variant:snake>]() -> Self {
                Self::$variant
            }
        }
    };

    (@ctor $variant:ident { $($field:ident : $ty:ty),* $(,)? }) => {
        define_port_error!(@ctor_impl $variant () () $( $field : $ty, )*);
    };

    (@ctor_impl $variant:ident ($($params:tt)*) ($($inits:tt)*) ) => {
        ::paste::paste! {
            pub fn [<$variant:snake>]($($params)*) -> Self {
                Self::$variant { $($inits)* }
            }
        }
    };

    (@ctor_impl $variant:ident ($($params:tt)*) ($($inits:tt)*) $field:ident : $ty:ty, $($rest:tt)*) => {
        define_port_error!(
            @ctor_impl
            $variant
            ($($params)* $field: impl Into<$ty>,)
            ($($inits)* $field: $field.into(),)
            $($rest)*
        );
    };
    (
        $(#[$outer:meta])*
        pub enum $name:ident {
            $(
                $(#[$variant_meta:meta])*
                $variant:ident $( { $($field:ident : $ty:ty),* $(,)? } )? => $message:expr
            ),* $(,)?
        }
    ) => {
        $(#[$outer])*
        #[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
        pub enum $name {
            $(
                $(#[$variant_meta])*
                #[error($message)]
                $variant $( { $($field : $ty),* } )?,
            )*
        }

        impl $name {
            $(
                define_port_error!(@ctor $variant $( { $($field : $ty),* } )?);
            )*
        }
    };
}

pub(crate) use define_port_error;

#[cfg(test)]
mod tests {
    //! Constructor coverage for generated port errors.
    define_port_error! {
        pub enum LandingProbeError {
            Missing => "nothing landed",
            Io { path: String } => "io failure at {path}",
            Retry { path: String, attempts: u32 } => "gave up on {path} after {attempts}",
            Deferred { after_secs: Option<u64> } => "deferred ({after_secs:?})",
        }
    }

    #[test]
    fn unit_variants_get_nullary_constructors() {
        assert_eq!(LandingProbeError::missing().to_string(), "nothing landed");
    }

    #[test]
    fn string_fields_accept_str() {
        let err = LandingProbeError::io("shards/a.json");
        assert_eq!(err.to_string(), "io failure at shards/a.json");
    }

    #[test]
    fn mixed_fields_keep_their_types() {
        let err = LandingProbeError::retry("b.json", 3_u32);
        assert_eq!(err.to_string(), "gave up on b.json after 3");
    }

    #[test]
    fn optional_fields_accept_bare_values() {
        let err = LandingProbeError::deferred(90_u64);
        assert_eq!(err, LandingProbeError::Deferred { after_secs: Some(90) });
    }
}
