use crate::driver::host::HostDeviceSpec;
use crate::error::{Error, Result};
use crate::program::BuildOptions;

/// Settings fixed for the lifetime of a [`Context`](crate::Context).
#[derive(Debug, Clone, Default)]
pub struct ContextConfig {
    /// Record a timing event for every submission on every queue.
    pub enable_profiling: bool,
    /// Options used by the convenience constructors that do not take any.
    pub build_options: BuildOptions,
}

impl ContextConfig {
    pub fn builder() -> ContextConfigBuilder {
        ContextConfigBuilder::new()
    }

    pub fn profiling() -> Self {
        Self {
            enable_profiling: true,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        for (name, _) in &self.build_options.defines {
            if name.is_empty() || name.contains(char::is_whitespace) {
                return Err(Error::config(format!("invalid macro name '{}'", name)));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct ContextConfigBuilder {
    config: ContextConfig,
}

impl ContextConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: ContextConfig::default(),
        }
    }

    pub fn enable_profiling(mut self, enable: bool) -> Self {
        self.config.enable_profiling = enable;
        self
    }

    pub fn build_options(mut self, options: BuildOptions) -> Self {
        self.config.build_options = options;
        self
    }

    pub fn build(self) -> Result<ContextConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Settings of the in-process [`HostDriver`](crate::driver::host::HostDriver).
#[derive(Debug, Clone)]
pub struct HostConfig {
    pub devices: Vec<HostDeviceSpec>,
    pub thread_name_prefix: String,
    pub stack_size: Option<usize>,
    /// Register the bundled reference kernels.
    pub builtin_kernels: bool,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            devices: vec![HostDeviceSpec::cpu()],
            thread_name_prefix: "nong-queue".to_string(),
            stack_size: Some(2 * 1024 * 1024),
            builtin_kernels: true,
        }
    }
}

impl HostConfig {
    pub fn builder() -> HostConfigBuilder {
        HostConfigBuilder::new()
    }

    pub fn validate(&self) -> Result<()> {
        if self.thread_name_prefix.is_empty() {
            return Err(Error::config("thread_name_prefix must not be empty"));
        }

        if let Some(size) = self.stack_size {
            if size < 64 * 1024 {
                return Err(Error::config("stack_size too small (min 64KB)"));
            }
        }

        for spec in &self.devices {
            spec.validate()?;
        }

        Ok(())
    }
}

#[derive(Debug)]
pub struct HostConfigBuilder {
    config: HostConfig,
    custom_devices: bool,
}

impl Default for HostConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl HostConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: HostConfig::default(),
            custom_devices: false,
        }
    }

    /// Adds a device. The first call replaces the default CPU device.
    pub fn device(mut self, spec: HostDeviceSpec) -> Self {
        if !self.custom_devices {
            self.config.devices.clear();
            self.custom_devices = true;
        }
        self.config.devices.push(spec);
        self
    }

    /// Exposes no devices at all.
    pub fn no_devices(mut self) -> Self {
        self.config.devices.clear();
        self.custom_devices = true;
        self
    }

    pub fn thread_name_prefix<S: Into<String>>(mut self, prefix: S) -> Self {
        self.config.thread_name_prefix = prefix.into();
        self
    }

    pub fn stack_size(mut self, size: usize) -> Self {
        self.config.stack_size = Some(size);
        self
    }

    pub fn builtin_kernels(mut self, enable: bool) -> Self {
        self.config.builtin_kernels = enable;
        self
    }

    pub fn build(self) -> Result<HostConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_config_builder() {
        let config = ContextConfig::builder()
            .enable_profiling(true)
            .build()
            .unwrap();
        assert!(config.enable_profiling);
        assert!(config.build_options.warnings_as_errors);
    }

    #[test]
    fn test_invalid_define_rejected() {
        let options = BuildOptions::default().define("BAD NAME", None);
        let result = ContextConfig::builder().build_options(options).build();
        assert!(result.is_err());
    }

    #[test]
    fn test_host_config_devices() {
        let config = HostConfig::builder()
            .device(HostDeviceSpec::gpu("Test GPU", "NVIDIA Corporation"))
            .device(HostDeviceSpec::cpu())
            .build()
            .unwrap();
        assert_eq!(config.devices.len(), 2);

        let config = HostConfig::builder().no_devices().build().unwrap();
        assert!(config.devices.is_empty());
    }

    #[test]
    fn test_host_config_validation() {
        assert!(HostConfig::builder().thread_name_prefix("").build().is_err());
        assert!(HostConfig::builder().stack_size(1024).build().is_err());
    }
}
