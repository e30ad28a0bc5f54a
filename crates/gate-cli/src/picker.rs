//! Line-oriented host picker shown on the inbound terminal.

use async_trait::async_trait;
use gateway_core::{GatewayResult, HostPicker, PickerAction, UserContext};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, Lines};

/// What one line of picker input asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    Pick(String),
    /// Narrow the listing to hosts containing the text; empty clears it.
    Filter(String),
    Reload,
    Quit,
    Invalid(String),
}

/// Interpret `line` against the full host list and the currently listed subset.
pub fn interpret(line: &str, hosts: &[String], listed: &[String]) -> Selection {
    let line = line.trim();
    match line.to_ascii_lowercase().as_str() {
        "" => return Selection::Filter(String::new()),
        "q" | "quit" | "exit" => return Selection::Quit,
        "r" | "reload" => return Selection::Reload,
        _ => {}
    }

    if let Ok(index) = line.parse::<usize>() {
        return match index.checked_sub(1).and_then(|i| listed.get(i)) {
            Some(host) => Selection::Pick(host.clone()),
            None => Selection::Invalid(format!("no host numbered {index}")),
        };
    }
    if let Some(host) = hosts.iter().find(|host| host.eq_ignore_ascii_case(line)) {
        return Selection::Pick(host.clone());
    }

    let needle = line.to_ascii_lowercase();
    let matches: Vec<&String> = hosts.iter().filter(|host| host.to_ascii_lowercase().contains(&needle)).collect();
    match matches.as_slice() {
        [] => Selection::Invalid(format!("no host matches '{line}'")),
        [only] => Selection::Pick((*only).clone()),
        _ => Selection::Filter(line.to_string()),
    }
}

pub struct TerminalPicker<R, W> {
    input: Lines<BufReader<R>>,
    output: W,
    filter: String,
}

impl TerminalPicker<tokio::io::Stdin, tokio::io::Stdout> {
    pub fn stdio() -> Self {
        Self::new(tokio::io::stdin(), tokio::io::stdout())
    }
}

impl<R, W> TerminalPicker<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(input: R, output: W) -> Self {
        Self {
            input: BufReader::new(input).lines(),
            output,
            filter: String::new(),
        }
    }

    async fn show(&mut self, text: &str) -> std::io::Result<()> {
        self.output.write_all(text.as_bytes()).await?;
        self.output.flush().await
    }

    fn listing(&self, user: &UserContext, listed: &[String]) -> String {
        let mut text = format!("\r\nHosts available to {}", user.name);
        if !user.hostgroups.is_empty() {
            let groups: Vec<&str> = user.hostgroups.iter().map(String::as_str).collect();
            text.push_str(&format!(" (groups: {})", groups.join(", ")));
        }
        if !self.filter.is_empty() {
            text.push_str(&format!(" matching '{}'", self.filter));
        }
        text.push_str(":\r\n");
        if listed.is_empty() {
            text.push_str("  (none)\r\n");
        }
        for (index, host) in listed.iter().enumerate() {
            text.push_str(&format!("  {:>3}) {host}\r\n", index + 1));
        }
        text.push_str("number, name or filter text; r reload, q quit > ");
        text
    }
}

#[async_trait]
impl<R, W> HostPicker for TerminalPicker<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    async fn pick(&mut self, user: &UserContext) -> GatewayResult<PickerAction> {
        let hosts: Vec<String> = user.allowed_hosts.iter().cloned().collect();
        loop {
            let needle = self.filter.to_ascii_lowercase();
            let listed: Vec<String> = hosts
                .iter()
                .filter(|host| host.to_ascii_lowercase().contains(&needle))
                .cloned()
                .collect();
            let listing = self.listing(user, &listed);
            self.show(&listing).await?;

            let Some(line) = self.input.next_line().await? else {
                return Ok(PickerAction::Quit);
            };
            match interpret(&line, &hosts, &listed) {
                Selection::Pick(host) => {
                    self.filter.clear();
                    return Ok(PickerAction::Connect(host));
                }
                Selection::Filter(text) => self.filter = text,
                Selection::Reload => {
                    self.filter.clear();
                    return Ok(PickerAction::Reload);
                }
                Selection::Quit => return Ok(PickerAction::Quit),
                Selection::Invalid(message) => self.show(&format!("{message}\r\n")).await?,
            }
        }
    }

    async fn notify(&mut self, message: &str) {
        if let Err(err) = self.show(&format!("\r\n{message}\r\n")).await {
            tracing::debug!(error = %err, "could not show picker message");
        }
    }
}
