use crate::db::DatabaseError;
use serde::{Deserialize, Serialize};

/// Macro to generate enum with as_str + std::str::FromStr pattern
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = DatabaseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(DatabaseError::InvalidEnum {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

str_enum!(ExtractionStatus {
    Pending => "pending",
    Processing => "processing",
    Completed => "completed",
    Error => "error",
});

str_enum!(SummaryStatus {
    None => "none",
    Processing => "processing",
    Completed => "completed",
    Error => "error",
});

impl ExtractionStatus {
    /// A status the pipeline may leave a document in after a call returns.
    pub fn is_settled(&self) -> bool {
        !matches!(self, Self::Processing)
    }
}

impl SummaryStatus {
    pub fn is_settled(&self) -> bool {
        !matches!(self, Self::Processing)
    }
}
