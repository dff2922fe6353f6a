//! String-backed enums stored in TEXT columns with CHECK constraints.

/// Define a closed set of string values with `as_str`, `parse` and serde
/// support. The database stores the string form.
#[macro_export]
macro_rules! define_text_enum {
    (
        $(#[$meta:meta])*
        $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident = $val:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
        pub enum $name {
            $( $(#[$vmeta])* #[serde(rename = $val)] $variant ),+
        }

        impl $name {
            /// Every variant, in declaration order.
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// The value stored in the database.
            pub fn as_str(self) -> &'static str {
                match self {
                    $( $name::$variant => $val ),+
                }
            }

            /// Parse the stored value.
            pub fn parse(value: &str) -> Result<Self, $crate::error::CoreError> {
                match value {
                    $( $val => Ok($name::$variant), )+
                    other => Err($crate::error::CoreError::Validation(format!(
                        concat!("Unknown ", stringify!($name), " '{}'"),
                        other
                    ))),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = $crate::error::CoreError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }
    };
}

define_text_enum! {
    /// What an artifact blob contains. Also the first path segment of its URI.
    ArtifactKind {
        LayoutJson = "layout_json",
        Sla = "sla",
        Png = "png",
        Pdf = "pdf",
        Preflight = "preflight",
        BuildMetadata = "build_metadata",
        WorkflowBundle = "workflow_bundle",
        WorkflowReport = "workflow_report",
        AssetImage = "asset_image",
    }
}

define_text_enum! {
    /// Which artifact store backend holds a blob.
    StorageKind {
        S3 = "s3",
        Local = "local",
    }
}

impl ArtifactKind {
    /// Default MIME type for blobs of this kind.
    pub fn default_mime(self) -> &'static str {
        match self {
            ArtifactKind::LayoutJson
            | ArtifactKind::Preflight
            | ArtifactKind::BuildMetadata => "application/json",
            ArtifactKind::Sla => "application/x-scribus",
            ArtifactKind::Png | ArtifactKind::AssetImage => "image/png",
            ArtifactKind::Pdf => "application/pdf",
            ArtifactKind::WorkflowBundle | ArtifactKind::WorkflowReport => "application/zip",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;
    use assert_matches::assert_matches;

    #[test]
    fn as_str_and_parse_agree() {
        for kind in ArtifactKind::ALL {
            assert_eq!(ArtifactKind::parse(kind.as_str()).unwrap(), *kind);
        }
    }

    #[test]
    fn unknown_value_is_a_validation_error() {
        assert_matches!(StorageKind::parse("ftp"), Err(CoreError::Validation(_)));
    }

    #[test]
    fn serde_uses_stored_value() {
        assert_eq!(serde_json::to_string(&ArtifactKind::WorkflowReport).unwrap(), "\"workflow_report\"");
        assert_eq!(ArtifactKind::Sla.default_mime(), "application/x-scribus");
    }
}
