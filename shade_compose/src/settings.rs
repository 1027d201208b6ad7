use std::fmt::Display;

/// a glsl `#version` pragma, e.g. `#version 300 es`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Version {
    pub number: u32,
    pub profile: Option<String>,
}

impl Version {
    pub fn new(number: u32) -> Self { Self { number, profile: None } }

    pub fn es(number: u32) -> Self { Self { number, profile: Some("es".into()) } }

    pub fn is_es(&self) -> bool { self.profile.as_deref() == Some("es") }

    /// whether variables are declared with `in`/`out` instead of
    /// `attribute`/`varying`
    pub fn uses_in_out(&self) -> bool {
        match self.is_es() {
            true => self.number >= 300,
            false => self.number >= 130,
        }
    }

    pub fn pragma(&self) -> String { format!("#version {self}") }
}

impl Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.profile {
            Some(profile) => write!(f, "{} {}", self.number, profile),
            None => write!(f, "{}", self.number),
        }
    }
}

/// how the [`Compiler`](crate::Compiler) picks names for shader objects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Naming {
    /// keep declared names where possible and resolve collisions with
    /// numbered suffixes (`name_1`, `name_2`...). Readable, but slower.
    #[default]
    Pretty,
    /// derive every name from the object's identity. Unreadable, but
    /// skips the collision search entirely.
    Fast,
}

/// ## configure shader compilation
/// this struct only has public fields and is expected to be filled out via
/// its constructor.
///
/// ## example
/// ```
/// shade_compose::CompileSettings {
///     naming: shade_compose::Naming::Fast,
///     ..Default::default()
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CompileSettings {
    pub naming: Naming,
    /// [`Naming::Fast`] identifiers (including the id suffix) are truncated
    /// to this length. Pretty names are never shortened.
    pub max_name_len: usize,
    /// how many numbered suffixes are tried for one name before giving up
    /// with [`Error::NameCollision`](crate::Error::NameCollision)
    pub max_suffix: u32,
    /// `#version` used for shaders whose templates do not declare one
    pub default_version: Option<Version>,
}

impl Default for CompileSettings {
    fn default() -> Self {
        CompileSettings {
            naming: Naming::Pretty,
            max_name_len: 32,
            max_suffix: 10_000,
            default_version: None,
        }
    }
}
