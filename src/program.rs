//! Compiled device programs and their build options.

use crate::driver::ProgramHandle;
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::{Path, PathBuf};

/// Compiler flags for device source.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BuildOptions {
    pub warnings_as_errors: bool,
    pub disable_optimizations: bool,
    pub strict_aliasing: bool,
    pub unsafe_math: bool,
    /// Preprocessor definitions, passed as `-D NAME[=VALUE]`.
    pub defines: Vec<(String, Option<String>)>,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            warnings_as_errors: true,
            disable_optimizations: false,
            strict_aliasing: true,
            unsafe_math: false,
            defines: Vec::new(),
        }
    }
}

impl BuildOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn warnings_as_errors(mut self, enable: bool) -> Self {
        self.warnings_as_errors = enable;
        self
    }

    pub fn disable_optimizations(mut self, enable: bool) -> Self {
        self.disable_optimizations = enable;
        self
    }

    pub fn strict_aliasing(mut self, enable: bool) -> Self {
        self.strict_aliasing = enable;
        self
    }

    pub fn unsafe_math(mut self, enable: bool) -> Self {
        self.unsafe_math = enable;
        self
    }

    pub fn define(mut self, name: impl Into<String>, value: Option<&str>) -> Self {
        self.defines.push((name.into(), value.map(String::from)));
        self
    }

    /// Compiler command line for these options.
    pub fn to_options_string(&self) -> String {
        let mut flags: Vec<String> = Vec::new();
        if self.warnings_as_errors {
            flags.push("-Werror".into());
        }
        if self.disable_optimizations {
            flags.push("-cl-opt-disable".into());
        }
        if self.strict_aliasing {
            flags.push("-cl-strict-aliasing".into());
        }
        if self.unsafe_math {
            flags.push("-cl-unsafe-math-optimizations".into());
        }
        for (name, value) in &self.defines {
            match value {
                Some(value) => flags.push(format!("-D {}={}", name, value)),
                None => flags.push(format!("-D {}", name)),
            }
        }
        flags.join(" ")
    }
}

impl fmt::Display for BuildOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_options_string())
    }
}

/// Program cache key: the source path, or a digest of in-memory source.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ProgramKey {
    Path(PathBuf),
    Source([u8; 32]),
}

impl ProgramKey {
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        ProgramKey::Path(path.as_ref().to_path_buf())
    }

    pub fn from_source(source: &str) -> Self {
        ProgramKey::Source(Sha256::digest(source.as_bytes()).into())
    }
}

impl fmt::Display for ProgramKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProgramKey::Path(path) => write!(f, "{}", path.display()),
            ProgramKey::Source(digest) => {
                write!(f, "source:")?;
                for byte in &digest[..6] {
                    write!(f, "{:02x}", byte)?;
                }
                Ok(())
            }
        }
    }
}

/// A successfully built program.
#[derive(Debug)]
pub struct Program {
    handle: ProgramHandle,
    key: ProgramKey,
    options: BuildOptions,
    build_log: String,
}

impl Program {
    pub(crate) fn new(handle: ProgramHandle, key: ProgramKey, options: BuildOptions, build_log: String) -> Self {
        Self {
            handle,
            key,
            options,
            build_log,
        }
    }

    pub(crate) fn handle(&self) -> ProgramHandle {
        self.handle
    }

    pub fn key(&self) -> &ProgramKey {
        &self.key
    }

    /// Options of the build that produced this program.
    pub fn options(&self) -> &BuildOptions {
        &self.options
    }

    /// Compiler output of a successful build; usually empty, warnings otherwise.
    pub fn build_log(&self) -> &str {
        &self.build_log
    }
}
