//! Filename synthesis for downloaded media items.
//!
//! Every item gets two candidate names: a primary one rendered from the
//! user-configured template, and a collision-resistant fallback used when a
//! different file already occupies the primary name. Templates reference item
//! metadata with `{{.Field}}` tokens over a fixed field set; referencing an
//! unknown field or rendering an empty string is a hard error, because blank
//! substitutions would silently produce ambiguous or colliding file names.

use thiserror::Error;

/// Default primary template: the remote file name, verbatim.
pub const DEFAULT_FILENAME_TEMPLATE: &str = "{{.FileName}}";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NameError {
    #[error("unknown template field {{{{.{0}}}}}")]
    UnknownField(String),
    #[error("unterminated {{{{ token in template")]
    UnterminatedToken,
    #[error("template rendered an empty name")]
    EmptyName,
}

/// Field values exposed to the naming templates.
#[derive(Debug, Clone, Copy, Default)]
pub struct NameVars<'a> {
    pub file_name: &'a str,
    pub image_key: &'a str,
    pub archived_md5: &'a str,
    pub upload_key: &'a str,
}

/// Naming capability: turn an item's metadata into a file name.
///
/// Kept as a trait so the synthesis logic is independent of how a particular
/// name is produced (token template, key splicing, or a test stub).
pub trait RenderName: Send + Sync {
    fn render(&self, vars: &NameVars<'_>) -> Result<String, NameError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    FileName,
    ImageKey,
    ArchivedMd5,
    UploadKey,
}

impl Field {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "FileName" => Some(Field::FileName),
            "ImageKey" => Some(Field::ImageKey),
            "ArchivedMD5" => Some(Field::ArchivedMd5),
            "UploadKey" => Some(Field::UploadKey),
            _ => None,
        }
    }

    fn resolve<'a>(&self, vars: &NameVars<'a>) -> &'a str {
        match self {
            Field::FileName => vars.file_name,
            Field::ImageKey => vars.image_key,
            Field::ArchivedMd5 => vars.archived_md5,
            Field::UploadKey => vars.upload_key,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Field(Field),
}

/// A `{{.Field}}` token template, parsed once at configuration time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenTemplate {
    segments: Vec<Segment>,
}

impl TokenTemplate {
    /// Parse a template string, rejecting unknown fields up front.
    pub fn parse(template: &str) -> Result<Self, NameError> {
        let mut segments = Vec::new();
        let mut rest = template;

        while let Some(open) = rest.find("{{") {
            if open > 0 {
                segments.push(Segment::Literal(rest[..open].to_string()));
            }
            let after_open = &rest[open + 2..];
            let close = after_open.find("}}").ok_or(NameError::UnterminatedToken)?;
            let token = after_open[..close].trim();
            let name = token.strip_prefix('.').unwrap_or(token);
            let field =
                Field::from_name(name).ok_or_else(|| NameError::UnknownField(name.to_string()))?;
            segments.push(Segment::Field(field));
            rest = &after_open[close + 2..];
        }
        if !rest.is_empty() {
            segments.push(Segment::Literal(rest.to_string()));
        }

        Ok(Self { segments })
    }
}

impl RenderName for TokenTemplate {
    fn render(&self, vars: &NameVars<'_>) -> Result<String, NameError> {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(s) => out.push_str(s),
                Segment::Field(f) => out.push_str(f.resolve(vars)),
            }
        }
        if out.is_empty() {
            return Err(NameError::EmptyName);
        }
        Ok(out)
    }
}

/// Default fallback naming: splice the image key into the file name right
/// before the final `.` extension, so `photo.jpg` becomes `photoAbC123.jpg`.
/// A name with no extension gets the key appended.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeySplicedName;

impl RenderName for KeySplicedName {
    fn render(&self, vars: &NameVars<'_>) -> Result<String, NameError> {
        let out = match vars.file_name.rfind('.') {
            Some(dot) => {
                let (stem, ext) = vars.file_name.split_at(dot);
                format!("{}{}{}", stem, vars.image_key, ext)
            }
            None => format!("{}{}", vars.file_name, vars.image_key),
        };
        if out.is_empty() {
            return Err(NameError::EmptyName);
        }
        Ok(out)
    }
}

/// The pair of naming templates a backup run operates with.
pub struct NameTemplates {
    pub primary: Box<dyn RenderName>,
    pub fallback: Box<dyn RenderName>,
}

impl NameTemplates {
    /// Build both templates from their configured strings. An empty string
    /// selects the corresponding default.
    pub fn from_config(file_names: &str, file_names_unique: &str) -> Result<Self, NameError> {
        let primary: Box<dyn RenderName> = if file_names.is_empty() {
            Box::new(TokenTemplate::parse(DEFAULT_FILENAME_TEMPLATE)?)
        } else {
            Box::new(TokenTemplate::parse(file_names)?)
        };
        let fallback: Box<dyn RenderName> = if file_names_unique.is_empty() {
            Box::new(KeySplicedName)
        } else {
            Box::new(TokenTemplate::parse(file_names_unique)?)
        };
        Ok(Self { primary, fallback })
    }
}
