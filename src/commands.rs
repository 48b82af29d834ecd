//! Service-level commands: container status, lifecycle, logs, direct
//! invocation and the front door.

use crate::color::{color_enabled_stderr, Color};
use crate::config::ServiceConfig;
use crate::container::{Container, ContainerRegistry, LogOptions, StartOptions, RUNTIME_PORT};
use crate::error::{GatewayError, Result};
use crate::invoke::{InvocationClient, InvokeOptions, InvokeResponse};
use crate::process::CommandRunner;
use crate::proxy::{ProxyConfig, ProxyServer, Router};
use serde_json::Value;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tracing::{info, warn};

const TABLE_HEADERS: [&str; 4] = ["FUNCTION", "CONTAINER NAME", "STATUS", "PORTS"];

/// Flags of the `logs` command.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LogsRequest {
    pub all: bool,
    pub watch: bool,
}

/// A service's functions and the containers that run them.
pub struct Gateway {
    service: ServiceConfig,
    registry: ContainerRegistry,
    runtime_host: String,
    invoke_retry: (u32, Duration),
    color: bool,
}

impl Gateway {
    /// Resolve every function's container against `src_path`.
    pub fn new(
        service: ServiceConfig,
        src_path: impl AsRef<Path>,
        runner: Arc<dyn CommandRunner>,
    ) -> Result<Self> {
        let configs = service.container_configs(src_path.as_ref())?;
        Ok(Self {
            service,
            registry: ContainerRegistry::new(runner, configs),
            runtime_host: "localhost".to_string(),
            invoke_retry: (3, Duration::from_millis(1000)),
            color: color_enabled_stderr(),
        })
    }

    /// Force colored console output on or off.
    pub fn color(mut self, enabled: bool) -> Self {
        self.color = enabled;
        self
    }

    /// Host where container ports are published.
    pub fn runtime_host(mut self, host: impl Into<String>) -> Self {
        self.runtime_host = host.into();
        self
    }

    pub fn invoke_retry(mut self, count: u32, interval: Duration) -> Self {
        self.invoke_retry = (count, interval);
        self
    }

    pub fn service(&self) -> &ServiceConfig {
        &self.service
    }

    pub fn registry(&self) -> &ContainerRegistry {
        &self.registry
    }

    /// Status table of every function's container.
    pub async fn status_table(&self) -> Result<String> {
        let containers = self.registry.select(&[]).await?;
        let rows: Vec<_> = containers
            .iter()
            .map(|c| (c.table_row(false), c.table_row(self.color)))
            .collect();
        Ok(render_table(&rows))
    }

    /// Print the status table to stderr.
    pub async fn ps(&self) -> Result<()> {
        let table = self.status_table().await?;
        let mut err = tokio::io::stderr();
        err.write_all(format!("\n{}\n", table).as_bytes()).await?;
        err.flush().await?;
        Ok(())
    }

    /// Start the selected containers, or all of them, concurrently.
    pub async fn start(&self, names: &[String], options: &StartOptions) -> Result<Vec<Container>> {
        let containers = self.registry.select(names).await?;
        let mut tasks = JoinSet::new();
        for container in containers {
            let options = options.clone();
            tasks.spawn(async move { container.start(&options).await });
        }

        let started = join_containers(tasks).await?;
        for container in &started {
            info!("The container \"{}\" has started", container.name());
        }
        Ok(started)
    }

    /// Stop the selected containers, or all of them, concurrently.
    pub async fn stop(&self, names: &[String]) -> Result<Vec<Container>> {
        let containers = self.registry.select(names).await?;
        let mut tasks = JoinSet::new();
        for container in containers {
            tasks.spawn(async move { container.stop().await });
        }

        let stopped = join_containers(tasks).await?;
        for container in &stopped {
            info!("The container \"{}\" has stopped", container.name());
        }
        Ok(stopped)
    }

    /// Stream logs of the selected running containers to stderr until every
    /// stream ends.
    pub async fn logs(&self, names: &[String], request: LogsRequest) -> Result<()> {
        let running: Vec<Container> = self
            .registry
            .select(names)
            .await?
            .into_iter()
            .filter(Container::is_running)
            .collect();

        if running.is_empty() {
            warn!("No running container to show logs for");
            return Ok(());
        }

        let mut tasks = JoinSet::new();
        for (container, options) in log_plan(&running, self.color, request) {
            let logs = container.log_streams(&options)?;
            for stream in logs.streams {
                tasks.spawn(async move {
                    let mut err = tokio::io::stderr();
                    stream.pipe_to(&mut err).await.map_err(GatewayError::from)
                });
            }
            tasks.spawn(logs.exit.wait());
        }

        while let Some(joined) = tasks.join_next().await {
            joined.map_err(|e| GatewayError::Io(std::io::Error::other(e)))??;
        }
        Ok(())
    }

    /// Invoke one function with `data`, starting its container when needed.
    ///
    /// A container this call had to start is stopped again afterwards, even
    /// when the invocation fails.
    pub async fn invoke(&self, name: &str, data: &Value, stdout: bool) -> Result<InvokeResponse> {
        let container = self.registry.get(name).await?;
        let was_running = container.is_running();
        let container = container.start(&StartOptions::default()).await?;

        let result = self.invoke_container(&container, data, stdout).await;

        if !was_running {
            match container.stop().await {
                Ok(stopped) => info!("The container \"{}\" has stopped", stopped.name()),
                Err(e) if result.is_ok() => return Err(e),
                Err(e) => warn!("Cannot stop container \"{}\": {}", container.name(), e),
            }
        }

        let response = result?;
        info!("The invocation has succeeded");
        Ok(response)
    }

    async fn invoke_container(
        &self,
        container: &Container,
        data: &Value,
        stdout: bool,
    ) -> Result<InvokeResponse> {
        let port = container
            .host_ports_to(RUNTIME_PORT)
            .first()
            .copied()
            .ok_or(GatewayError::PortNotBound(RUNTIME_PORT))?;

        let (count, interval) = self.invoke_retry;
        let options = InvokeOptions::new(port).retry(count, interval).stdout(stdout);
        let client = InvocationClient::new(self.runtime_host.clone());

        // Keeps the function output apart from the log lines above it.
        tokio::io::stderr().write_all(b"\n").await?;
        client.invoke(&data.to_string(), &options).await
    }

    /// Start every function with an HTTP endpoint, serve the front door
    /// until `shutdown` resolves, then stop the containers started here.
    pub async fn serve<F>(&self, config: ProxyConfig, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let listener = TcpListener::bind(config.bind_addr()).await?;
        self.serve_on(listener, config, shutdown).await
    }

    /// Like [`Gateway::serve`] on an already bound listener.
    pub async fn serve_on<F>(&self, listener: TcpListener, config: ProxyConfig, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let mut started = Vec::new();
        let result = self.serve_routes(listener, config, shutdown, &mut started).await;

        for container in started {
            match container.stop().await {
                Ok(_) => info!("The container \"{}\" has stopped", container.name()),
                Err(e) => warn!("Cannot stop container \"{}\": {}", container.name(), e),
            }
        }
        result
    }

    async fn serve_routes<F>(
        &self,
        listener: TcpListener,
        config: ProxyConfig,
        shutdown: F,
        started: &mut Vec<Container>,
    ) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let functions = self.service.http_functions();
        if functions.is_empty() {
            warn!("No function declares an http event");
        }

        let mut router = Router::new();
        for name in &functions {
            let container = self.registry.get(name).await?;
            let was_running = container.is_running();
            let container = container.start(&StartOptions::default()).await?;
            if !was_running {
                started.push(container.clone());
            }

            let port = container
                .host_ports_to(RUNTIME_PORT)
                .first()
                .copied()
                .ok_or(GatewayError::PortNotBound(RUNTIME_PORT))?;

            for route in self.service.route_configs(name, port)? {
                router.push(route)?;
            }
        }

        let server = ProxyServer::new(config, router);
        tokio::select! {
            served = server.serve(listener) => served?,
            _ = shutdown => info!("Shutting down the API Gateway"),
        }
        Ok(())
    }
}

async fn join_containers(mut tasks: JoinSet<Result<Container>>) -> Result<Vec<Container>> {
    let mut containers = Vec::with_capacity(tasks.len());
    while let Some(joined) = tasks.join_next().await {
        let container = joined.map_err(|e| GatewayError::Io(std::io::Error::other(e)))??;
        containers.push(container);
    }
    containers.sort_by(|a, b| a.function_name().cmp(b.function_name()));
    Ok(containers)
}

/// Label width and color for each container's log streams.
///
/// Names are padded to the longest name plus one; colors rotate in
/// selection order unless `color` is off.
pub fn log_plan(
    containers: &[Container],
    color: bool,
    request: LogsRequest,
) -> Vec<(Container, LogOptions)> {
    let prefix_size = containers
        .iter()
        .map(|c| c.function_name().len() + 1)
        .max()
        .unwrap_or(0);

    containers
        .iter()
        .enumerate()
        .map(|(index, container)| {
            let options = LogOptions {
                color: if color { Color::from_index(index) } else { Color::Default },
                prefix_size,
                all: request.all,
                watch: request.watch,
            };
            (container.clone(), options)
        })
        .collect()
}

/// Render status rows under the table headers.
///
/// Each row comes as (plain, shown): column widths are measured on the
/// plain text so escape sequences in the shown text do not break alignment.
pub fn render_table(rows: &[([String; 4], [String; 4])]) -> String {
    let mut widths = TABLE_HEADERS.map(str::len);
    for (plain, _) in rows {
        for (width, cell) in widths.iter_mut().zip(plain) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let mut out = String::new();
    let headers = TABLE_HEADERS.map(str::to_string);
    let lines = std::iter::once((&headers, &headers)).chain(rows.iter().map(|(p, s)| (p, s)));
    for (plain, shown) in lines {
        let mut line = String::new();
        for (i, width) in widths.iter().enumerate() {
            line.push_str(&shown[i]);
            if i + 1 < widths.len() {
                let pad = width - plain[i].chars().count() + 3;
                line.push_str(&" ".repeat(pad));
            }
        }
        out.push_str(line.trim_end());
        out.push('\n');
    }
    out
}

/// Event payload for `invoke`: the JSON file at `path` overlaid by the
/// JSON text `data`. Object keys from `data` win.
pub fn invocation_data(path: Option<&Path>, data: Option<&str>) -> Result<Value> {
    let from_file = match path {
        Some(path) => {
            let text = std::fs::read_to_string(path).map_err(|e| {
                GatewayError::Config(format!("cannot read {}: {}", path.display(), e))
            })?;
            Some(parse_json(&text)?)
        }
        None => None,
    };
    let from_data = data.map(parse_json).transpose()?;

    Ok(match (from_file, from_data) {
        (Some(Value::Object(mut base)), Some(Value::Object(overlay))) => {
            base.extend(overlay);
            Value::Object(base)
        }
        (_, Some(overlay)) => overlay,
        (Some(base), None) => base,
        (None, None) => Value::Object(serde_json::Map::new()),
    })
}

fn parse_json(text: &str) -> Result<Value> {
    serde_json::from_str(text).map_err(|source| GatewayError::MalformedJson {
        input: text.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::{CommandOutput, StreamingProcess};
    use async_trait::async_trait;
    use serde_json::json;
    use std::io::Write;

    struct AllRunning;

    #[async_trait]
    impl CommandRunner for AllRunning {
        async fn output(&self, _program: &str, args: &[String]) -> std::io::Result<CommandOutput> {
            Ok(CommandOutput::ok(format!(
                r#"[{{"Name":"/{}","State":{{"Status":"running","Running":true}}}}]"#,
                args[1]
            )))
        }

        fn spawn_streams(&self, _: &str, _: &[String], _: bool) -> std::io::Result<StreamingProcess> {
            Ok(StreamingProcess {
                streams: Vec::new(),
                exit: Box::pin(async { Ok::<_, std::io::Error>(CommandOutput::ok("")) }),
            })
        }
    }

    const SERVICE: &str = r#"
service: shop
functions:
  orders:
    handler: shop.orders
  ws:
    handler: shop.ws
"#;

    fn gateway() -> Gateway {
        let service = ServiceConfig::from_yaml(SERVICE).unwrap();
        Gateway::new(service, "/work", Arc::new(AllRunning))
            .unwrap()
            .color(false)
    }

    #[test]
    fn test_render_table_aligns_on_plain_text() {
        let plain = [
            "orders".to_string(),
            "shop_orders".to_string(),
            "running".to_string(),
            String::new(),
        ];
        let mut shown = plain.clone();
        shown[2] = Color::Green.paint("running");

        let table = render_table(&[(plain.clone(), shown)]);
        let lines: Vec<_> = table.lines().collect();
        assert_eq!(lines[0], "FUNCTION   CONTAINER NAME   STATUS    PORTS");
        assert_eq!(
            lines[1],
            "orders     shop_orders      \u{1b}[32mrunning\u{1b}[39m"
        );

        let plain_only = render_table(&[(plain.clone(), plain)]);
        assert_eq!(
            plain_only.lines().nth(1),
            Some("orders     shop_orders      running")
        );
    }

    #[tokio::test]
    async fn test_status_table() {
        let table = gateway().status_table().await.unwrap();
        assert!(table.starts_with("FUNCTION"));
        assert!(table.contains("orders     shop_orders      running"));
        assert!(table.contains("ws         shop_ws          running"));
    }

    #[tokio::test]
    async fn test_log_plan() {
        let gateway = gateway();
        let containers = gateway.registry().select(&[]).await.unwrap();

        let plan = log_plan(&containers, true, LogsRequest { all: true, watch: false });
        assert_eq!(plan.len(), 2);
        assert_eq!(plan[0].1.prefix_size, "orders".len() + 1);
        assert_eq!(plan[0].1.color, Color::Cyan);
        assert_eq!(plan[1].1.color, Color::Yellow);
        assert!(plan[1].1.all);

        let plain = log_plan(&containers, false, LogsRequest::default());
        assert!(plain.iter().all(|(_, o)| o.color == Color::Default));
    }

    #[test]
    fn test_invocation_data_overlay() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"id": 1, "name": "from-file"}}"#).unwrap();

        let data = invocation_data(Some(file.path()), Some(r#"{"name": "from-flag"}"#)).unwrap();
        assert_eq!(data, json!({"id": 1, "name": "from-flag"}));

        assert_eq!(invocation_data(None, None).unwrap(), json!({}));
        assert_eq!(
            invocation_data(Some(file.path()), None).unwrap(),
            json!({"id": 1, "name": "from-file"})
        );
    }

    #[test]
    fn test_invocation_data_errors() {
        assert!(matches!(
            invocation_data(None, Some("{oops")),
            Err(GatewayError::MalformedJson { .. })
        ));
        assert!(matches!(
            invocation_data(Some(Path::new("/nonexistent/event.json")), None),
            Err(GatewayError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_invoke_unknown_function() {
        let result = gateway().invoke("missing", &json!({}), false).await;
        assert!(matches!(result, Err(GatewayError::FunctionNotFound(_))));
    }

    #[tokio::test]
    async fn test_invoke_without_port_binding() {
        // Running, but the inspection has no port bindings.
        let result = gateway().invoke("orders", &json!({}), false).await;
        assert!(matches!(result, Err(GatewayError::PortNotBound(8080))));
    }
}
