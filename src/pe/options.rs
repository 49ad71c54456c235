use crate::options::ParseMode;

/// Parsing Options structure for the PE parser
#[derive(Debug, Copy, Clone)]
pub struct ParseOptions {
    /// Wether the parser should resolve rvas or not. Default: true
    pub resolve_rva: bool,
    /// Whether or not to parse attribute certificates.
    /// Set to false for in-memory representation, as the [loader does not map this info into
    /// memory](https://learn.microsoft.com/en-us/windows/win32/debug/pe-format#other-contents-of-the-file).
    /// For on-disk representations, leave as true.
    /// Default: true
    #[cfg(feature = "in_memory")]
    pub parse_attribute_certificates: bool,
    /// How to treat a recoverable inconsistency inside the resolved import/export
    /// tables (e.g. a name RVA that falls outside every section). `Strict` (the
    /// default) aborts the whole parse; `Permissive` logs a warning and continues
    /// with the affected entry skipped or replaced by a placeholder.
    pub parse_mode: ParseMode,
}

impl ParseOptions {
    /// Returns a parse options structure with default values
    pub fn default() -> Self {
        ParseOptions {
            resolve_rva: true,
            #[cfg(feature = "in_memory")]
            parse_attribute_certificates: true,
            parse_mode: ParseMode::Strict,
        }
    }

    /// Returns a parse options structure that resolves RVAs permissively: a
    /// malformed import/export entry is skipped with a warning instead of
    /// aborting the whole parse.
    pub fn permissive() -> Self {
        ParseOptions {
            parse_mode: ParseMode::Permissive,
            ..Self::default()
        }
    }
}
