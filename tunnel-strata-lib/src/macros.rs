/// Generates a wire-compatible newtype for a protocol number field.
///
/// The generated type wraps the on-wire representation (`u8`, `U16<BigEndian>`, ...)
/// so it can sit directly inside `#[repr(C, packed)]` zerocopy headers, and comes
/// with named constants, primitive conversions, `Display` and serde support.
///
/// Names are rendered kebab-case through a private strum enum, so `IpProto::GRE`
/// displays as `gre`, while numbers without a constant display as hex.
#[macro_export]
macro_rules! protocol_constants {
    (@construct_u8 $ztype:ty, $val:expr) => { $val };

    (@construct_new $ztype:ty, $val:expr) => { <$ztype>::new($val) };

    (@impl $(#[$outer:meta])*, $type_name:ident, $ztype:ty, $primitive:ty, $strategy:ident, $( $const_name:ident = $val:literal; )+ ) => {
        paste::paste! {
            #[doc = concat!("A `", stringify!($primitive), "` protocol number as carried on the wire.")]
            $(#[$outer])*
            #[derive(
                Clone,
                Copy,
                PartialEq,
                Eq,
                Hash,
                Debug,
                zerocopy::FromBytes,
                zerocopy::IntoBytes,
                zerocopy::Immutable,
                zerocopy::KnownLayout,
                zerocopy::Unaligned,
            )]
            #[repr(transparent)]
            pub struct $type_name(pub $ztype);

            impl $type_name {
                $(
                    pub const $const_name: $type_name = $type_name($crate::protocol_constants!(@$strategy $ztype, $val));
                )+

                /// Returns the raw protocol number
                #[inline]
                pub fn value(&self) -> $primitive {
                    self.0.into()
                }

                /// Returns the registered name, if this number has one
                pub fn name(&self) -> Option<&'static str> {
                    <[< $type_name Name >] as TryFrom<$primitive>>::try_from(self.value())
                        .ok()
                        .map(|n| n.into())
                }

                /// Returns true when the number has a named constant
                #[inline]
                pub fn is_known(&self) -> bool {
                    self.name().is_some()
                }
            }

            #[derive(Debug, PartialEq, strum::EnumString, strum::IntoStaticStr, Clone, Copy)]
            #[strum(serialize_all = "kebab-case")]
            #[allow(non_camel_case_types, dead_code)]
            enum [< $type_name Name >] {
                $(
                    $const_name,
                )+
            }

            impl From<[< $type_name Name >]> for $primitive {
                fn from(v: [< $type_name Name >]) -> Self {
                    match v {
                        $(
                            [< $type_name Name >]::$const_name => $val,
                        )+
                    }
                }
            }

            impl TryFrom<$primitive> for [< $type_name Name >] {
                type Error = ();
                fn try_from(v: $primitive) -> Result<Self, Self::Error> {
                    match v {
                        $(
                            $val => Ok([< $type_name Name >]::$const_name),
                        )+
                        _ => Err(()),
                    }
                }
            }

            impl From<$primitive> for $type_name {
                #[inline]
                fn from(v: $primitive) -> Self {
                    Self(v.into())
                }
            }

            impl From<$type_name> for $primitive {
                #[inline]
                fn from(v: $type_name) -> Self {
                    v.0.into()
                }
            }

            impl std::fmt::Display for $type_name {
                fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                    match self.name() {
                        Some(name) => f.write_str(name),
                        None => write!(f, "0x{:x}", self.value()),
                    }
                }
            }

            #[cfg(feature = "protocol_names")]
            impl serde::Serialize for $type_name {
                fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
                where
                    S: serde::Serializer,
                {
                    match self.name() {
                        Some(name) => serializer.serialize_str(name),
                        None => serializer.serialize_str(&format!("0x{:x}", self.value())),
                    }
                }
            }

            #[cfg(feature = "protocol_names")]
            impl<'de> serde::Deserialize<'de> for $type_name {
                fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
                where
                    D: serde::Deserializer<'de>,
                {
                    use serde::de::Error;

                    let value = <String as serde::Deserialize>::deserialize(deserializer)?;
                    if let Ok(variant) = <[< $type_name Name >] as std::str::FromStr>::from_str(&value) {
                        let p: $primitive = variant.into();
                        return Ok($type_name(p.into()));
                    }

                    let hex = value
                        .strip_prefix("0x")
                        .or_else(|| value.strip_prefix("0X"))
                        .ok_or_else(|| D::Error::custom(format!("unknown {}: {}", stringify!($type_name), value)))?;
                    let p = <$primitive>::from_str_radix(hex, 16)
                        .map_err(|_| D::Error::custom(format!("invalid hex: {}", value)))?;
                    Ok($type_name(p.into()))
                }
            }

            #[cfg(not(feature = "protocol_names"))]
            impl serde::Serialize for $type_name {
                fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
                where
                    S: serde::Serializer,
                {
                    serde::Serialize::serialize(&self.value(), serializer)
                }
            }

            #[cfg(not(feature = "protocol_names"))]
            impl<'de> serde::Deserialize<'de> for $type_name {
                fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
                where
                    D: serde::Deserializer<'de>,
                {
                    let p = <$primitive as serde::Deserialize>::deserialize(deserializer)?;
                    Ok($type_name(p.into()))
                }
            }
        }
    };

    (   $(#[$outer:meta])*
        $type_name:ident,
        u8,
        $primitive:ty:
        $( $const_name:ident = $val:literal; )+
    ) => {
        $crate::protocol_constants!(@impl $(#[$outer])*, $type_name, u8, $primitive, construct_u8, $( $const_name = $val; )+ );
    };

    (   $(#[$outer:meta])*
        $type_name:ident,
        $ztype:ty,
        $primitive:ty:
        $( $const_name:ident = $val:literal; )+
    ) => {
        $crate::protocol_constants!(@impl $(#[$outer])*, $type_name, $ztype, $primitive, construct_new, $( $const_name = $val; )+ );
    };
}
