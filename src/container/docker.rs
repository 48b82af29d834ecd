//! Argument builders for the docker CLI.

use crate::error::{GatewayError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;

/// Program invoked for every container operation.
pub const DOCKER: &str = "docker";

/// Port the Lambda runtime interface emulator listens on inside the container.
pub const RUNTIME_PORT: u16 = 8080;

/// Directory the runtime image loads the function binary from.
pub const RUNTIME_BIN_DIR: &str = "/var/runtime";

const IMAGE_X86_64: &str = "public.ecr.aws/lambda/provided:al2-x86_64";
const IMAGE_ARM64: &str = "public.ecr.aws/lambda/provided:al2-arm64";

/// Target CPU architecture of a function.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Architecture {
    #[default]
    X86_64,
    Arm64,
}

impl Architecture {
    /// Value for `docker run --platform`.
    pub fn platform(&self) -> &'static str {
        match self {
            Architecture::X86_64 => "linux/amd64",
            Architecture::Arm64 => "linux/arm64/v8",
        }
    }

    /// Base runtime image for this architecture.
    pub fn image(&self) -> &'static str {
        match self {
            Architecture::X86_64 => IMAGE_X86_64,
            Architecture::Arm64 => IMAGE_ARM64,
        }
    }
}

impl FromStr for Architecture {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "x86_64" => Ok(Architecture::X86_64),
            "arm64" => Ok(Architecture::Arm64),
            other => Err(GatewayError::Config(format!(
                "unknown architecture \"{}\" (expected x86_64 or arm64)",
                other
            ))),
        }
    }
}

/// Inputs for `docker run`.
#[derive(Debug, Clone)]
pub struct RunOptions<'a> {
    pub name: &'a str,
    /// Function binary on the host.
    pub artifact: &'a Path,
    pub host_port: u16,
    pub env: &'a BTreeMap<String, String>,
    pub env_file: Option<&'a str>,
    /// Extra flags, split on whitespace.
    pub docker_args: Option<&'a str>,
    pub arch: Architecture,
}

/// Arguments for `docker run` that start a detached runtime container.
pub fn run_args(options: &RunOptions<'_>) -> Result<Vec<String>> {
    let artifact = options.artifact;
    let bin_dir = artifact.parent().filter(|p| !p.as_os_str().is_empty());
    let bin_name = artifact.file_name().and_then(|n| n.to_str());

    let (Some(bin_dir), Some(bin_name)) = (bin_dir, bin_name) else {
        return Err(GatewayError::Config(format!(
            "artifact path \"{}\" must name a file inside a directory",
            artifact.display()
        )));
    };

    let mut args: Vec<String> = vec![
        "run".into(),
        "-i".into(),
        "-d".into(),
        "--rm".into(),
        "-v".into(),
        format!("{}:{}", bin_dir.display(), RUNTIME_BIN_DIR),
        "-p".into(),
        format!("{}:{}", options.host_port, RUNTIME_PORT),
    ];

    for (key, value) in options.env {
        args.push("--env".into());
        args.push(format!("{}={}", key, escape_env_value(value)));
    }

    if let Some(env_file) = options.env_file {
        args.push("--env-file".into());
        args.push(env_file.to_string());
    }

    args.extend([
        "--name".into(),
        options.name.to_string(),
        "--platform".into(),
        options.arch.platform().to_string(),
    ]);

    if let Some(extra) = options.docker_args {
        args.extend(extra.split_whitespace().map(str::to_string));
    }

    args.push(options.arch.image().to_string());
    args.push(bin_name.to_string());
    Ok(args)
}

fn escape_env_value(value: &str) -> String {
    value.replace(' ', "\\ ")
}

pub fn inspect_args(name: &str) -> Vec<String> {
    vec!["inspect".into(), name.into()]
}

pub fn stop_args(name: &str) -> Vec<String> {
    vec!["stop".into(), name.into()]
}

pub fn logs_args(name: &str, follow: bool) -> Vec<String> {
    let mut args = vec!["logs".to_string()];
    if follow {
        args.push("--follow".into());
    }
    args.push(name.into());
    args
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_run_args() {
        let mut env = BTreeMap::new();
        env.insert("GREETING".to_string(), "hello world".to_string());
        env.insert("LEVEL".to_string(), "debug".to_string());
        let artifact = PathBuf::from("/work/target/lambda/hello/bootstrap");

        let args = run_args(&RunOptions {
            name: "svc_hello",
            artifact: &artifact,
            host_port: 9000,
            env: &env,
            env_file: Some(".env.local"),
            docker_args: Some("--network  local --memory 256m"),
            arch: Architecture::Arm64,
        })
        .unwrap();

        assert_eq!(
            args,
            vec![
                "run",
                "-i",
                "-d",
                "--rm",
                "-v",
                "/work/target/lambda/hello:/var/runtime",
                "-p",
                "9000:8080",
                "--env",
                "GREETING=hello\\ world",
                "--env",
                "LEVEL=debug",
                "--env-file",
                ".env.local",
                "--name",
                "svc_hello",
                "--platform",
                "linux/arm64/v8",
                "--network",
                "local",
                "--memory",
                "256m",
                "public.ecr.aws/lambda/provided:al2-arm64",
                "bootstrap",
            ]
        );
    }

    #[test]
    fn test_run_args_defaults_to_x86() {
        let env = BTreeMap::new();
        let artifact = PathBuf::from("target/bootstrap");
        let args = run_args(&RunOptions {
            name: "c",
            artifact: &artifact,
            host_port: 1,
            env: &env,
            env_file: None,
            docker_args: None,
            arch: Architecture::default(),
        })
        .unwrap();

        assert!(args.contains(&"linux/amd64".to_string()));
        assert_eq!(args[args.len() - 2], IMAGE_X86_64);
        assert!(!args.contains(&"--env-file".to_string()));
    }

    #[test]
    fn test_run_args_rejects_bare_file_name() {
        let env = BTreeMap::new();
        let artifact = PathBuf::from("bootstrap");
        let result = run_args(&RunOptions {
            name: "c",
            artifact: &artifact,
            host_port: 1,
            env: &env,
            env_file: None,
            docker_args: None,
            arch: Architecture::X86_64,
        });
        assert!(matches!(result, Err(GatewayError::Config(_))));
    }

    #[test]
    fn test_architecture_from_str() {
        assert_eq!("arm64".parse::<Architecture>().unwrap(), Architecture::Arm64);
        assert!("sparc".parse::<Architecture>().is_err());
    }

    #[test]
    fn test_logs_args() {
        assert_eq!(logs_args("c", false), vec!["logs", "c"]);
        assert_eq!(logs_args("c", true), vec!["logs", "--follow", "c"]);
    }
}
