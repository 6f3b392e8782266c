//! Declared storage types of mapped members.

use chrono::NaiveDateTime;

/// Storage type a member is declared with. Dialect renderers map these onto
/// concrete column types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SqlType {
    TinyInt,
    SmallInt,
    Integer,
    BigInt,
    Real,
    Double,
    Decimal { precision: u8, scale: u8 },
    Boolean,
    Char(u32),
    VarChar(u32),
    Text,
    Blob,
    Date,
    Time,
    DateTime,
    Timestamp,
    Uuid,
    Json,
    /// Column type passed through to the dialect verbatim.
    Custom(&'static str),
}

impl SqlType {
    pub const fn is_integer(&self) -> bool {
        matches!(
            self,
            SqlType::TinyInt | SqlType::SmallInt | SqlType::Integer | SqlType::BigInt
        )
    }

    /// Integers, floats and decimals.
    pub const fn is_numeric(&self) -> bool {
        self.is_integer() || matches!(self, SqlType::Real | SqlType::Double | SqlType::Decimal { .. })
    }

    pub const fn is_text(&self) -> bool {
        matches!(self, SqlType::Char(_) | SqlType::VarChar(_) | SqlType::Text)
    }

    pub const fn is_temporal(&self) -> bool {
        matches!(
            self,
            SqlType::Date | SqlType::Time | SqlType::DateTime | SqlType::Timestamp
        )
    }

    /// Length limit implied by a character type.
    pub const fn char_length(&self) -> Option<u32> {
        match self {
            SqlType::Char(len) | SqlType::VarChar(len) => Some(*len),
            _ => None,
        }
    }
}

/// Rust types with a default storage mapping, used by
/// [`MemberDescriptor::of`](crate::MemberDescriptor::of).
pub trait TypeInfo {
    const SQL_TYPE: SqlType;
    const NULLABLE: bool = false;
}

macro_rules! type_info {
    ($($ty:ty => $sql:expr),* $(,)?) => {
        $(
            impl TypeInfo for $ty {
                const SQL_TYPE: SqlType = $sql;
            }
        )*
    };
}

type_info! {
    i8 => SqlType::TinyInt,
    i16 => SqlType::SmallInt,
    i32 => SqlType::Integer,
    i64 => SqlType::BigInt,
    f32 => SqlType::Real,
    f64 => SqlType::Double,
    bool => SqlType::Boolean,
    String => SqlType::Text,
    Vec<u8> => SqlType::Blob,
    NaiveDateTime => SqlType::DateTime,
    serde_json::Value => SqlType::Json,
}

impl<T: TypeInfo> TypeInfo for Option<T> {
    const SQL_TYPE: SqlType = T::SQL_TYPE;
    const NULLABLE: bool = true;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_map_to_nullable_columns() {
        assert_eq!(<Option<String> as TypeInfo>::SQL_TYPE, SqlType::Text);
        assert!(<Option<String> as TypeInfo>::NULLABLE);
        assert!(!<i64 as TypeInfo>::NULLABLE);
        assert_eq!(<NaiveDateTime as TypeInfo>::SQL_TYPE, SqlType::DateTime);
    }

    #[test]
    fn classification() {
        assert!(SqlType::BigInt.is_integer());
        assert!(SqlType::BigInt.is_numeric());
        assert!(SqlType::Double.is_numeric());
        assert!(!SqlType::Double.is_integer());
        assert!(SqlType::Char(3).is_text());
        assert_eq!(SqlType::VarChar(40).char_length(), Some(40));
        assert_eq!(SqlType::Text.char_length(), None);
        assert!(SqlType::Timestamp.is_temporal());
    }
}
