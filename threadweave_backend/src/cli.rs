use crate::comments::{AddCommentInput, CommentLinker};
use crate::config::ThreadweaveConfig;
use crate::database::Database;
use crate::invalidation::{LoggingSignal, SharedSignal};
use crate::threading::{CreatePostInput, ExpandedThread, ReplyRef, ThreadService};
use crate::user_index::UserIndex;
use crate::users::{UpsertUserInput, UserService};
use anyhow::{anyhow, Result};
use std::io::{self, Write};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

/// Run the interactive CLI for posting and browsing threads.
pub async fn run_cli(config: ThreadweaveConfig, database: Database) -> Result<()> {
    let signal: SharedSignal = Arc::new(LoggingSignal);
    let mut session = CliSession {
        thread_service: ThreadService::new(database.clone(), signal.clone())
            .with_max_depth(config.listing.max_depth),
        comment_linker: CommentLinker::new(database.clone(), signal),
        user_service: UserService::new(database.clone()),
        user_index: UserIndex::new(database),
        page_size: config.listing.default_page_size,
        active_user: None,
    };

    println!("Threadweave CLI ready. Type 'help' for a list of commands.");

    let stdin = tokio::io::stdin();
    let mut reader = BufReader::new(stdin);

    loop {
        match &session.active_user {
            Some(user) => print!("threadweave({user})> "),
            None => print!("threadweave> "),
        }
        io::stdout().flush()?;

        let mut line = String::new();
        let read = reader.read_line(&mut line).await?;
        if read == 0 {
            println!("Exiting");
            break;
        }
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let tokens = match shell_words::split(trimmed) {
            Ok(tokens) if !tokens.is_empty() => tokens,
            Ok(_) => continue,
            Err(err) => {
                println!("Unable to parse command: {err}");
                continue;
            }
        };

        match session.handle_command(&tokens).await {
            Ok(LoopAction::Continue) => {}
            Ok(LoopAction::Exit) => break,
            Err(err) => {
                println!("Error: {err:#}");
            }
        }
    }

    Ok(())
}

struct CliSession {
    thread_service: ThreadService,
    comment_linker: CommentLinker,
    user_service: UserService,
    user_index: UserIndex,
    page_size: usize,
    active_user: Option<String>,
}

enum LoopAction {
    Continue,
    Exit,
}

impl CliSession {
    async fn handle_command(&mut self, tokens: &[String]) -> Result<LoopAction> {
        let command = tokens[0].as_str();
        match command {
            "help" => {
                print_help();
            }
            "add-user" => {
                if tokens.len() < 4 {
                    println!("Usage: add-user <id> <username> \"display name\"");
                    return Ok(LoopAction::Continue);
                }
                self.add_user(&tokens[1], &tokens[2], tokens[3..].join(" "))
                    .await?;
            }
            "as" => {
                if tokens.len() < 2 {
                    println!("Usage: as <user_id>");
                    return Ok(LoopAction::Continue);
                }
                let user = self.user_service.get_user(&tokens[1]).await?;
                println!("Acting as {} (@{})", user.name, user.username);
                self.active_user = Some(user.id);
            }
            "post" => {
                if tokens.len() < 2 {
                    println!("Usage: post \"message\" [--community <id>]");
                    return Ok(LoopAction::Continue);
                }
                let (text, community_id) = split_community_flag(&tokens[1..]);
                let id = self
                    .thread_service
                    .create_post(CreatePostInput {
                        text,
                        author_id: self.require_user()?,
                        community_id,
                        invalidation_topic: "/".into(),
                    })
                    .await?;
                println!("Posted thread {id}");
            }
            "comment" | "reply" => {
                if tokens.len() < 3 {
                    println!("Usage: comment <thread_id> \"message\"");
                    return Ok(LoopAction::Continue);
                }
                let parent_id = tokens[1].clone();
                let id = self
                    .comment_linker
                    .add_comment(AddCommentInput {
                        invalidation_topic: format!("/thread/{parent_id}"),
                        parent_id,
                        text: tokens[2..].join(" "),
                        author_id: self.require_user()?,
                    })
                    .await?;
                println!("Posted comment {id}");
            }
            "list" | "threads" => {
                let page = tokens
                    .get(1)
                    .and_then(|v| v.parse::<usize>().ok())
                    .unwrap_or(1);
                self.list(page).await?;
            }
            "show" | "thread" => {
                if tokens.len() < 2 {
                    println!("Usage: show <thread_id> [depth]");
                    return Ok(LoopAction::Continue);
                }
                let thread = match tokens.get(2).and_then(|v| v.parse::<usize>().ok()) {
                    Some(depth) => {
                        self.thread_service
                            .get_by_id_with_depth(&tokens[1], depth)
                            .await?
                    }
                    None => self.thread_service.get_by_id(&tokens[1]).await?,
                };
                print!("{}", render_thread(&thread));
            }
            "mine" => {
                let user_id = self.require_user()?;
                let threads = self.user_index.list_authored(&user_id).await?;
                if threads.is_empty() {
                    println!("You have not posted yet.");
                }
                for thread in threads {
                    println!("{}", summary_line(&thread));
                }
            }
            "reconcile" => {
                let relinked = self.comment_linker.reconcile().await?;
                println!("Relinked {} comment(s)", relinked.len());
                for id in relinked {
                    println!("  - {id}");
                }
            }
            "quit" | "exit" => return Ok(LoopAction::Exit),
            other => {
                println!("Unknown command '{other}'. Type 'help' for a list of commands.");
            }
        }
        Ok(LoopAction::Continue)
    }

    fn require_user(&self) -> Result<String> {
        self.active_user
            .clone()
            .ok_or_else(|| anyhow!("no active user; run 'add-user' or 'as <user_id>' first"))
    }

    async fn add_user(&mut self, id: &str, username: &str, name: String) -> Result<()> {
        let user = self
            .user_service
            .upsert_user(UpsertUserInput {
                id: id.to_string(),
                name,
                username: username.to_string(),
                image: None,
                onboarded: true,
            })
            .await?;
        println!("Saved user {} (@{})", user.id, user.username);
        self.active_user = Some(user.id);
        Ok(())
    }

    async fn list(&self, page: usize) -> Result<()> {
        let listing = self.thread_service.list_top_level(page, self.page_size).await?;
        if listing.items.is_empty() {
            println!("No threads on page {page}. Use 'post' to create one.");
            return Ok(());
        }
        for thread in &listing.items {
            println!("{}", summary_line(thread));
        }
        if listing.has_next {
            println!("(more on page {})", page + 1);
        }
        Ok(())
    }
}

fn print_help() {
    println!("Available commands:");
    println!("  help                          Show this help message");
    println!("  add-user ID USERNAME NAME     Create or update a user and act as them");
    println!("  as <user_id>                  Switch the active user");
    println!("  post MSG [--community ID]     Create a top-level thread");
    println!("  comment <thread_id> MSG       Reply to a thread or comment");
    println!("  list [PAGE]                   List top-level threads, newest first");
    println!("  show <thread_id> [DEPTH]      Display a thread and its replies");
    println!("  mine                          List the active user's threads");
    println!("  reconcile                     Relink comments missing from their parent");
    println!("  exit                          Quit the CLI");
}

fn split_community_flag(tokens: &[String]) -> (String, Option<String>) {
    let mut words = Vec::new();
    let mut community = None;
    let mut iter = tokens.iter();
    while let Some(token) = iter.next() {
        if token == "--community" {
            community = iter.next().cloned();
        } else {
            words.push(token.as_str());
        }
    }
    (words.join(" "), community)
}

fn summary_line(thread: &ExpandedThread) -> String {
    format!(
        "[{}] {}: {} (replies: {}, {})",
        thread.id,
        thread.author.name,
        thread.text,
        thread.children.len(),
        thread.created_at
    )
}

/// Indented tree view. Unexpanded replies are shown by id.
fn render_thread(thread: &ExpandedThread) -> String {
    let mut out = String::new();
    render_into(thread, 0, &mut out);
    out
}

fn render_into(thread: &ExpandedThread, indent: usize, out: &mut String) {
    let pad = "  ".repeat(indent);
    out.push_str(&format!(
        "{pad}{} ({}) at {}\n",
        thread.author.name, thread.id, thread.created_at
    ));
    out.push_str(&format!("{pad}  {}\n", thread.text));
    for child in &thread.children {
        match child {
            ReplyRef::Expanded(reply) => render_into(reply, indent + 1, out),
            ReplyRef::Id(id) => out.push_str(&format!("{pad}  -> {id} (use 'show {id}')\n")),
        }
    }
}
