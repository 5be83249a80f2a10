use std::io::Write;
use std::path::PathBuf;

use ganesha_llm::{ModelCatalog, StreamEventPayload};
use ganesha_storage::Conversation;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::chat::{AppEvent, ChatController};

/// One line of terminal input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Send(String),
    New,
    List,
    /// 1-based position in the conversation list.
    Select(usize),
    Delete(usize),
    Models,
    Model(String),
    Theme { dark: bool },
    Attach(PathBuf),
    Stop,
    Help,
    Quit,
    Invalid(String),
}

/// Parses a line of input. Anything not starting with `/` is a prompt.
pub fn parse_command(line: &str) -> Command {
    let line = line.trim();
    let Some(rest) = line.strip_prefix('/') else {
        return Command::Send(line.to_string());
    };

    let (name, argument) = match rest.split_once(char::is_whitespace) {
        Some((name, argument)) => (name, argument.trim()),
        None => (rest, ""),
    };

    match (name, argument) {
        ("new", "") => Command::New,
        ("list", "") => Command::List,
        ("select", index) => parse_index(index).map_or_else(
            || Command::Invalid("usage: /select <n>".to_string()),
            Command::Select,
        ),
        ("delete", index) => parse_index(index).map_or_else(
            || Command::Invalid("usage: /delete <n>".to_string()),
            Command::Delete,
        ),
        ("models", "") => Command::Models,
        ("model", "") => Command::Invalid("usage: /model <name>".to_string()),
        ("model", name) => Command::Model(name.to_string()),
        ("theme", "dark") => Command::Theme { dark: true },
        ("theme", "light") => Command::Theme { dark: false },
        ("theme", _) => Command::Invalid("usage: /theme dark|light".to_string()),
        ("attach", "") => Command::Invalid("usage: /attach <path>".to_string()),
        ("attach", path) => Command::Attach(PathBuf::from(path)),
        ("stop", "") => Command::Stop,
        ("help", "") => Command::Help,
        ("quit" | "exit", "") => Command::Quit,
        _ => Command::Invalid(format!("unknown command: /{rest}")),
    }
}

fn parse_index(argument: &str) -> Option<usize> {
    argument.parse::<usize>().ok().filter(|index| *index > 0)
}

const HELP: &str = "\
commands:
  /new               start a new conversation
  /list              list conversations
  /select <n>        switch to conversation n
  /delete <n>        delete conversation n
  /models            show available models
  /model <name>      use another model
  /theme dark|light  remember a theme preference
  /attach <path>     attach an image to the next message
  /stop              stop the current reply (Ctrl-C also works)
  /quit              exit";

enum Input {
    Line(std::io::Result<Option<String>>),
    Event(Option<AppEvent>),
    Interrupt,
}

/// Line-oriented front end: reads prompts and commands from stdin and prints replies as
/// they stream in.
pub struct TerminalApp {
    controller: ChatController,
}

impl TerminalApp {
    pub fn new(controller: ChatController) -> Self {
        Self { controller }
    }

    pub async fn run(mut self) -> std::io::Result<()> {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        self.controller.refresh_models();

        println!("ganesha: chatting with {} (/help for commands)", self.controller.model());
        self.prompt();

        loop {
            let input = tokio::select! {
                line = lines.next_line() => Input::Line(line),
                event = self.controller.next_event() => Input::Event(event),
                _ = tokio::signal::ctrl_c() => Input::Interrupt,
            };

            match input {
                Input::Line(Ok(Some(line))) => {
                    if !self.handle_command(parse_command(&line)) {
                        break;
                    }
                }
                Input::Line(Ok(None)) => break,
                Input::Line(Err(error)) => {
                    self.controller.shutdown();
                    return Err(error);
                }
                Input::Event(Some(event)) => self.render_event(event),
                Input::Event(None) => break,
                Input::Interrupt => {
                    if !self.controller.stop() {
                        break;
                    }
                }
            }
        }

        self.controller.shutdown();
        println!();
        Ok(())
    }

    /// Returns false when the user asked to quit.
    fn handle_command(&mut self, command: Command) -> bool {
        match command {
            Command::Send(prompt) => {
                if self.controller.is_streaming() {
                    println!("[still answering; /stop to interrupt]");
                } else if self.controller.send(&prompt).is_some() {
                    print!("assistant> ");
                    flush();
                    return true;
                }
            }
            Command::New => {
                self.controller.new_conversation();
                println!("[new conversation]");
            }
            Command::List => self.print_conversations(),
            Command::Select(position) => match self.conversation_at(position) {
                Some(id) => {
                    self.controller.select_conversation(&id);
                    if let Some(conversation) = self.controller.current() {
                        print_transcript(conversation);
                    }
                }
                None => println!("[no conversation {position}]"),
            },
            Command::Delete(position) => match self.conversation_at(position) {
                Some(id) => {
                    self.controller.delete_conversation(&id);
                    println!("[deleted conversation {position}]");
                }
                None => println!("[no conversation {position}]"),
            },
            Command::Models => match self.controller.catalog() {
                Some(catalog) => print_catalog(catalog, self.controller.model()),
                None => {
                    println!("[loading models]");
                    self.controller.refresh_models();
                }
            },
            Command::Model(name) => {
                if self.controller.set_model(&name) {
                    println!("[model: {}]", self.controller.model());
                }
            }
            Command::Theme { dark } => {
                self.controller.set_dark_theme(dark);
                println!("[theme: {}]", if dark { "dark" } else { "light" });
            }
            Command::Attach(path) => match self.controller.attach_image_file(&path) {
                Ok(()) => println!(
                    "[{} image(s) attached to the next message]",
                    self.controller.pending_images().len()
                ),
                Err(error) => println!("[{error}]"),
            },
            Command::Stop => {
                if !self.controller.stop() {
                    println!("[nothing to stop]");
                }
            }
            Command::Help => println!("{HELP}"),
            Command::Quit => return false,
            Command::Invalid(message) => println!("[{message}]"),
        }

        self.prompt();
        true
    }

    fn render_event(&mut self, event: AppEvent) {
        match event {
            AppEvent::Stream(event) => match event.payload {
                StreamEventPayload::Prefix => {}
                StreamEventPayload::Chunk(text) => {
                    print!("{text}");
                    flush();
                }
                StreamEventPayload::Finished | StreamEventPayload::Error(_) => {
                    println!();
                    self.prompt();
                }
                StreamEventPayload::Cancelled => {
                    println!(" [stopped]");
                    self.prompt();
                }
            },
            AppEvent::ModelsLoaded(catalog) => {
                if let Some(warning) = &catalog.warning {
                    tracing::warn!(warning = %warning, "using fallback model list");
                }
            }
        }
    }

    fn conversation_at(&self, position: usize) -> Option<ganesha_storage::ConversationId> {
        self.controller
            .conversations()
            .get(position.checked_sub(1)?)
            .map(|conversation| conversation.id.clone())
    }

    fn print_conversations(&self) {
        let current = self.controller.current().map(|conversation| &conversation.id);
        if self.controller.conversations().is_empty() {
            println!("[no conversations yet]");
        }
        for (index, conversation) in self.controller.conversations().iter().enumerate() {
            let marker = if Some(&conversation.id) == current { '*' } else { ' ' };
            println!(
                "{marker} {:>3}. {} ({} messages)",
                index + 1,
                conversation.display_title(),
                conversation.messages().len()
            );
        }
    }

    fn prompt(&self) {
        if !self.controller.is_streaming() {
            print!("you> ");
            flush();
        }
    }
}

fn print_transcript(conversation: &Conversation) {
    println!("== {} ==", conversation.display_title());
    for message in conversation.messages() {
        let attachments = match message.images.len() {
            0 => String::new(),
            count => format!(" [{count} image(s)]"),
        };
        println!("{}>{attachments} {}", message.role.as_str(), message.content);
    }
}

fn print_catalog(catalog: &ModelCatalog, selected: &str) {
    if let Some(warning) = &catalog.warning {
        println!("[{warning}]");
    }
    for name in catalog.names() {
        let marker = if name == selected { '*' } else { ' ' };
        println!("{marker} {name}");
    }
}

fn flush() {
    let _ = std::io::stdout().flush();
}
