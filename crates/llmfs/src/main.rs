//! llmfs — an agent file server.
//!
//! Assembles a synthetic namespace over the ninefs library and serves it on
//! 9P2000. Each agent directory exposes the conventional file set:
//!
//! ```text
//! /<agent>/ctl      control file  (model NAME | status | reset)
//! /<agent>/input    write a prompt, starts a generation on output
//! /<agent>/output   stream file with the generation gate
//! /<agent>/code     fenced code blocks extracted from the output
//! /<agent>/events   queue of lifecycle events, one read consumes one
//! /<agent>/status   current agent state
//! /routes           persistent source -> destination pipes
//! ```
//!
//! The built-in agent echoes its prompt back in small chunks. That stands in
//! for a real model adapter while exercising every contract a real one
//! needs: reset/append/finish on the stream, set_ready on the code file,
//! events on the queue. From a mount:
//!
//! ```sh
//! while true; do cat $mnt/echo/output; done &
//! echo 'say hi' > $mnt/echo/input
//! ```

use {
    async_trait::async_trait,
    clap::Parser,
    log::info,
    ninefs::{
        ctl::{CtlFile, CtlHandler},
        fcall::{QId, Stat},
        file::{CallbackFile, Dir, FileMeta, SyntheticFile},
        queue::QueueFile,
        rerror,
        routes::{RouteManager, RoutesFile},
        srv::{DEFAULT_MSIZE, Server},
        stream::StreamFile,
        supplement::SupplementaryFile,
    },
    std::sync::{
        Arc, Mutex,
        atomic::{AtomicU64, Ordering},
    },
    tokio::time::{Duration, sleep},
};

/// Pause between output chunks, so streaming is observable from a shell
const CHUNK_DELAY: Duration = Duration::from_millis(10);
const CHUNK_SIZE: usize = 16;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum AgentState {
    Idle,
    Generating,
}

/// A deterministic stand-in for an LLM adapter: one generation per prompt,
/// the reply being the prompt itself.
struct EchoAgent {
    name: String,
    model: Mutex<String>,
    state: Mutex<AgentState>,
    generations: AtomicU64,
    output: Arc<StreamFile>,
    code: Arc<SupplementaryFile>,
    events: Arc<QueueFile>,
}

impl EchoAgent {
    fn new(name: &str) -> Arc<EchoAgent> {
        Arc::new(EchoAgent {
            name: name.to_owned(),
            model: Mutex::new("echo-1".to_owned()),
            state: Mutex::new(AgentState::Idle),
            generations: AtomicU64::new(0),
            output: StreamFile::new("output"),
            code: SupplementaryFile::new("code"),
            events: QueueFile::new("events"),
        })
    }

    /// The agent's directory in the served tree.
    fn build_dir(self: &Arc<Self>) -> Arc<Dir> {
        let dir = Dir::new(&self.name);
        dir.add(CtlFile::new("ctl", self.clone()));
        dir.add(InputFile::new(self.clone()));
        dir.add(self.output.clone());
        dir.add(self.code.clone());
        dir.add(self.events.clone());

        let agent = self.clone();
        dir.add(CallbackFile::read_only("status", move || {
            agent.status_text().into_bytes()
        }));

        dir
    }

    fn status_text(&self) -> String {
        let state = match *self.state.lock().unwrap() {
            AgentState::Idle => "idle",
            AgentState::Generating => "generating",
        };
        format!(
            "state {state}\nmodel {}\ngenerations {}\n",
            self.model.lock().unwrap(),
            self.generations.load(Ordering::Relaxed),
        )
    }

    /// Run one generation: stream the prompt back through `output`, land
    /// any fenced code blocks in `code`, post lifecycle events.
    async fn generate(self: Arc<Self>, prompt: String) {
        let n = self.generations.fetch_add(1, Ordering::Relaxed) + 1;
        *self.state.lock().unwrap() = AgentState::Generating;
        self.events.post(format!("generation {n} started").as_bytes());

        self.output.reset();
        for chunk in prompt.as_bytes().chunks(CHUNK_SIZE) {
            self.output.append(chunk);
            sleep(CHUNK_DELAY).await;
        }

        if let Some(code) = extract_fenced(&prompt) {
            self.code.set_ready(code.as_bytes());
        }

        self.output.finish();
        self.events.post(format!("generation {n} finished").as_bytes());
        *self.state.lock().unwrap() = AgentState::Idle;
    }
}

#[async_trait]
impl CtlHandler for EchoAgent {
    async fn execute(&self, command: &str) -> ninefs::Result<Option<String>> {
        let (verb, arg) = match command.split_once(' ') {
            Some((verb, arg)) => (verb, arg.trim()),
            None => (command, ""),
        };

        match verb {
            "model" => {
                if arg.is_empty() {
                    return Ok(Some(self.model.lock().unwrap().clone()));
                }
                *self.model.lock().unwrap() = arg.to_owned();
                Ok(Some(format!("model set to {arg}")))
            }
            "status" => Ok(Some(self.status_text())),
            "reset" => {
                // abandon the current generation, leaving readers at EOF
                self.output.reset();
                self.output.finish();
                *self.state.lock().unwrap() = AgentState::Idle;
                Ok(Some("reset".to_owned()))
            }
            _ => rerror!(format!(
                "Unknown command: {verb}. Available: model, status, reset"
            )),
        }
    }

    async fn status(&self) -> Vec<u8> {
        self.status_text().into_bytes()
    }
}

/// Write a prompt, get a generation. Reading returns the last prompt.
struct InputFile {
    meta: FileMeta,
    agent: Arc<EchoAgent>,
    last_prompt: Mutex<String>,
}

impl InputFile {
    fn new(agent: Arc<EchoAgent>) -> Arc<InputFile> {
        Arc::new(InputFile {
            meta: FileMeta::file("input"),
            agent,
            last_prompt: Mutex::new(String::new()),
        })
    }
}

#[async_trait]
impl SyntheticFile for InputFile {
    fn qid(&self) -> QId {
        self.meta.qid()
    }

    fn name(&self) -> String {
        self.meta.name().to_owned()
    }

    async fn stat(&self) -> Stat {
        self.meta.stat(self.last_prompt.lock().unwrap().len() as u64)
    }

    async fn read(&self, _handle: u64, offset: u64, count: u32) -> ninefs::Result<Vec<u8>> {
        let prompt = self.last_prompt.lock().unwrap();
        let bytes = prompt.as_bytes();
        let start = (offset as usize).min(bytes.len());
        let end = (start + count as usize).min(bytes.len());
        Ok(bytes[start..end].to_vec())
    }

    async fn write(&self, _handle: u64, _offset: u64, data: &[u8]) -> ninefs::Result<u32> {
        let Ok(text) = std::str::from_utf8(data) else {
            return rerror!("Prompts must be UTF-8");
        };
        let prompt = text.trim();
        if prompt.is_empty() {
            return Ok(data.len() as u32);
        }

        *self.last_prompt.lock().unwrap() = prompt.to_owned();
        self.meta.touch();

        // the generation runs in its own task; the Rwrite goes straight
        // back so the writer is never coupled to generation latency
        tokio::spawn(self.agent.clone().generate(prompt.to_owned()));
        Ok(data.len() as u32)
    }
}

/// Pull the bodies of ``` fenced blocks out of a prompt, newline-joined.
fn extract_fenced(text: &str) -> Option<String> {
    let mut blocks = Vec::new();
    let mut rest = text;
    while let Some(open) = rest.find("```") {
        let after = &rest[open + 3..];
        // skip the info string on the opening fence line
        let body_start = after.find('\n').map(|i| i + 1).unwrap_or(after.len());
        let body = &after[body_start..];
        let Some(close) = body.find("```") else {
            break;
        };
        blocks.push(body[..close].trim_end_matches('\n'));
        rest = &body[close + 3..];
    }
    if blocks.is_empty() {
        None
    } else {
        Some(blocks.join("\n"))
    }
}

fn build_root(agents: &[String]) -> Arc<Dir> {
    let root = Dir::root();

    let routes = RouteManager::new();
    root.add(RoutesFile::new(routes));

    for name in agents {
        let agent = EchoAgent::new(name);
        root.add(agent.build_dir());
    }

    root
}

#[derive(Debug, clap::Parser)]
struct Cli {
    /// proto!address!port
    /// where: proto = tcp | unix
    address: String,

    /// Agent directories to serve (repeatable)
    #[arg(long = "agent", default_value = "echo")]
    agents: Vec<String>,

    /// Maximum 9P message size offered to clients
    #[arg(long, default_value_t = DEFAULT_MSIZE)]
    msize: u32,
}

async fn llmfs_main(
    Cli {
        address,
        agents,
        msize,
    }: Cli,
) -> ninefs::Result<i32> {
    let root = build_root(&agents);

    info!("serving agents {agents:?} on {address}");
    println!("[*] Agents: {}", agents.join(", "));
    println!("[*] Ready to accept clients: {address}");

    Server::new(root).msize(msize).serve(&address).await.and(Ok(0))
}

#[tokio::main]
async fn main() {
    env_logger::init();

    let exit_code = llmfs_main(Cli::parse()).await.unwrap_or_else(|e| {
        eprintln!("Error: {e:?}");
        -1
    });

    std::process::exit(exit_code);
}
