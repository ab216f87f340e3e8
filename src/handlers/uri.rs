use std::fmt;

/// A URI split into `scheme://netloc/path`.
///
/// Input without a `scheme://` prefix is kept whole as the path with an
/// empty scheme, which resolves to the default handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedUri {
    raw: String,
    scheme: String,
    netloc: String,
    path: String,
}

impl ParsedUri {
    pub fn parse(raw: &str) -> Self {
        if let Some((scheme, rest)) = raw.split_once("://") {
            if is_valid_scheme(scheme) {
                let (netloc, path) = match rest.find('/') {
                    Some(idx) => rest.split_at(idx),
                    None => (rest, ""),
                };
                return Self {
                    raw: raw.to_string(),
                    scheme: scheme.to_ascii_lowercase(),
                    netloc: netloc.to_string(),
                    path: path.to_string(),
                };
            }
        }

        Self {
            raw: raw.to_string(),
            scheme: String::new(),
            netloc: String::new(),
            path: raw.to_string(),
        }
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn netloc(&self) -> &str {
        &self.netloc
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Everything after `scheme://`.
    pub fn target(&self) -> String {
        format!("{}{}", self.netloc, self.path)
    }
}

impl fmt::Display for ParsedUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

fn is_valid_scheme(scheme: &str) -> bool {
    let mut chars = scheme.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}
