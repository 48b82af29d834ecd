//! Container log streams with a per-function line label.

use crate::color::Color;
use crate::error::{GatewayError, Result};
use crate::process::{ExitFuture, OutputStream};
use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// How `Container::log_streams` should read and label logs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogOptions {
    /// Color of the function name label.
    pub color: Color,
    /// Width the function name is padded to.
    pub prefix_size: usize,
    /// Include the container's stderr.
    pub all: bool,
    /// Keep following until the container stops.
    pub watch: bool,
}

/// Label written in front of every log line of `function_name`.
pub fn line_label(function_name: &str, options: &LogOptions) -> String {
    let padded = format!("{:<width$}", function_name, width = options.prefix_size);
    format!("{}| ", options.color.paint(&padded))
}

/// Inserts a prefix at the start of every line of a chunked byte stream.
#[derive(Debug, Clone)]
pub struct LinePrefixer {
    prefix: Vec<u8>,
    pending: Vec<u8>,
}

impl LinePrefixer {
    pub fn new(prefix: impl Into<Vec<u8>>) -> Self {
        Self {
            prefix: prefix.into(),
            pending: Vec::new(),
        }
    }

    /// Feed a chunk; returns every line it completed, prefixed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<u8> {
        self.pending.extend_from_slice(chunk);

        let Some(last_newline) = self.pending.iter().rposition(|b| *b == b'\n') else {
            return Vec::new();
        };

        let rest = self.pending.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.pending, rest);

        let mut out = Vec::with_capacity(complete.len() + self.prefix.len());
        for line in complete.split_inclusive(|b| *b == b'\n') {
            out.extend_from_slice(&self.prefix);
            out.extend_from_slice(line);
        }
        out
    }

    /// Flush an unterminated last line, if any, with a trailing newline.
    pub fn finish(&mut self) -> Option<Vec<u8>> {
        if self.pending.is_empty() {
            return None;
        }
        let mut out = self.prefix.clone();
        out.append(&mut self.pending);
        out.push(b'\n');
        Some(out)
    }
}

/// One output stream of a container, labelled line by line.
pub struct LogStream {
    reader: OutputStream,
    prefixer: LinePrefixer,
}

impl LogStream {
    pub fn new(reader: OutputStream, label: impl Into<Vec<u8>>) -> Self {
        Self {
            reader,
            prefixer: LinePrefixer::new(label),
        }
    }

    /// Copy the stream into `writer` until it ends, labelling each line.
    pub async fn pipe_to<W>(mut self, writer: &mut W) -> std::io::Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        let mut buf = vec![0u8; 8 * 1024];
        loop {
            let n = self.reader.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            let lines = self.prefixer.push(&buf[..n]);
            if !lines.is_empty() {
                writer.write_all(&lines).await?;
                writer.flush().await?;
            }
        }

        if let Some(rest) = self.prefixer.finish() {
            writer.write_all(&rest).await?;
        }
        writer.flush().await
    }
}

/// Exit of the process that feeds a container's log streams.
pub struct LogExit {
    command: String,
    exit: ExitFuture,
}

impl LogExit {
    pub fn new(command: impl Into<String>, exit: ExitFuture) -> Self {
        Self {
            command: command.into(),
            exit,
        }
    }

    /// Wait for the process to end. A non-zero exit is an error carrying
    /// its stderr.
    pub async fn wait(self) -> Result<()> {
        let LogExit { command, exit } = self;
        let output = exit.await.map_err(|source| GatewayError::Spawn {
            command: command.clone(),
            source,
        })?;
        output.into_result(&command)?;
        Ok(())
    }
}

/// Labelled log streams of one container.
pub struct ContainerLogs {
    pub streams: Vec<LogStream>,
    pub exit: LogExit,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::CommandOutput;

    #[test]
    fn test_prefixes_each_line_across_chunks() {
        let mut prefixer = LinePrefixer::new("[prefix] ");
        let mut out = Vec::new();
        for chunk in [
            "Lorem ipsum do",
            "lor si\nt ame",
            "t, consectetur \nadipiscing elit. Pha\nsell",
            "us pulvinar ",
            "nibh\nsed mauris convall",
        ] {
            out.extend(prefixer.push(chunk.as_bytes()));
        }
        out.extend(prefixer.finish().unwrap_or_default());

        let expected = [
            "[prefix] Lorem ipsum dolor si",
            "[prefix] t amet, consectetur ",
            "[prefix] adipiscing elit. Pha",
            "[prefix] sellus pulvinar nibh",
            "[prefix] sed mauris convall\n",
        ]
        .join("\n");
        assert_eq!(String::from_utf8(out).unwrap(), expected);
    }

    #[test]
    fn test_nothing_left_to_flush() {
        let mut prefixer = LinePrefixer::new("[prefix] ");
        let out = prefixer.push(b"Lorem ipsum dolor si\n");
        assert_eq!(out, b"[prefix] Lorem ipsum dolor si\n");
        assert!(prefixer.finish().is_none());
    }

    #[test]
    fn test_line_label() {
        let options = LogOptions {
            prefix_size: 6,
            ..LogOptions::default()
        };
        assert_eq!(line_label("api", &options), "api   | ");

        let colored = LogOptions {
            color: Color::Cyan,
            prefix_size: 4,
            ..LogOptions::default()
        };
        assert_eq!(line_label("api", &colored), "\u{1b}[36mapi \u{1b}[39m| ");
    }

    #[tokio::test]
    async fn test_pipe_to() {
        let reader: OutputStream = Box::new(std::io::Cursor::new(b"one\ntwo".to_vec()));
        let stream = LogStream::new(reader, "fn| ");
        let mut out: Vec<u8> = Vec::new();
        stream.pipe_to(&mut out).await.unwrap();
        assert_eq!(out, b"fn| one\nfn| two\n");
    }

    #[tokio::test]
    async fn test_log_exit() {
        let ok = LogExit::new(
            "docker logs a",
            Box::pin(async { Ok::<_, std::io::Error>(CommandOutput::ok("")) }),
        );
        assert!(ok.wait().await.is_ok());

        let failed = LogExit::new(
            "docker logs a",
            Box::pin(async {
                Ok::<_, std::io::Error>(CommandOutput {
                    code: Some(1),
                    stdout: String::new(),
                    stderr: "Error: No such container: a".to_string(),
                })
            }),
        );
        match failed.wait().await {
            Err(GatewayError::CommandFailed { command, stderr, .. }) => {
                assert_eq!(command, "docker logs a");
                assert!(stderr.contains("No such container"));
            }
            other => panic!("unexpected: {:?}", other.err()),
        }
    }
}
