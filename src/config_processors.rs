use justconfig::error::ConfigError;
use justconfig::item::{MapAction, StringItem};

/// Remove quotes from configuration strings.
pub trait Unquote
where
    Self: Sized,
{
    fn unquote(self) -> Result<StringItem, ConfigError>;
}

impl Unquote for Result<StringItem, ConfigError> {
    /// Trims the value and strips one pair of surrounding double quotes, if present.
    /// Unquoted values are kept as they are.
    fn unquote(self) -> Result<StringItem, ConfigError> {
        self?.map(|v| {
            let v = v.trim();

            if v.len() >= 2 && v.starts_with('"') && v.ends_with('"') {
                MapAction::Replace(vec![v[1..v.len() - 1].to_owned()])
            } else {
                MapAction::Replace(vec![v.to_owned()])
            }
        })
    }
}

/// Lowercase selector values such as `model.normalization = Z_SCORE`.
pub trait Lowercase
where
    Self: Sized,
{
    fn lowercase(self) -> Result<StringItem, ConfigError>;
}

impl Lowercase for Result<StringItem, ConfigError> {
    fn lowercase(self) -> Result<StringItem, ConfigError> {
        self?.map(|v| MapAction::Replace(vec![v.to_lowercase()]))
    }
}
