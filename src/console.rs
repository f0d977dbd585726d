use crate::{
    error::JobError,
    model::event::Event,
    store::JobStore,
};
use anyhow::{
    bail,
    Result,
};
use log::{
    debug,
    info,
    warn,
};
use std::{
    str::FromStr,
    sync::Arc,
};
use tokio::{
    io::{
        stdin,
        AsyncBufReadExt,
        BufReader,
    },
    sync::mpsc,
};

/// Line commands accepted on stdin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    NewJob,
    History,
    Show(String),
    Current,
    Status,
    Help,
}

impl FromStr for Command {
    type Err = anyhow::Error;

    fn from_str(line: &str) -> Result<Self> {
        let mut words = line.split_whitespace();
        let command = match (words.next(), words.next()) {
            (Some("new"), None) => Command::NewJob,
            (Some("history"), None) => Command::History,
            (Some("show"), Some(id)) => Command::Show(id.to_string()),
            (Some("current"), None) => Command::Current,
            (Some("status"), None) => Command::Status,
            (Some("help"), None) => Command::Help,
            _ => bail!("unknown command {:?}; try `help`", line.trim()),
        };
        if words.next().is_some() {
            bail!("too many arguments in {:?}", line.trim());
        }
        Ok(command)
    }
}

const HELP: &str = "\
new          archive the current job and start a new one
history      list archived jobs, newest first
show <id>    print a job's contents
current      show the job receiving data
status       show the reported printer status";

/// Runs `command` against the store and returns what to print.
pub async fn execute(store: &JobStore, command: Command) -> Result<String> {
    let output = match command {
        Command::NewJob => format!("Started job {}", store.new_job().await?.id),
        Command::History => {
            let jobs = store.list_archived().await?;
            if jobs.is_empty() {
                "No archived jobs".to_string()
            } else {
                jobs.iter()
                    .map(|job| format!("{}  {:>10} bytes  {}", job.id, job.size, job.path.display()))
                    .collect::<Vec<_>>()
                    .join("\n")
            }
        }
        Command::Show(id) => match store.read_job(&id).await {
            Ok(data) => String::from_utf8_lossy(&data).into_owned(),
            Err(JobError::NotFound(id)) => format!("No job named {}", id),
            Err(e) => return Err(e.into()),
        },
        Command::Current => {
            let job = store.current_job().await;
            format!(
                "{} (started {}) -> {}",
                job.id,
                job.created.to_rfc3339(),
                job.path.display()
            )
        }
        Command::Status => store.status().await.to_string(),
        Command::Help => HELP.to_string(),
    };
    Ok(output)
}

fn log_event(event: &Event, echo: bool) {
    match event {
        Event::NewJob { id } => info!("New print job {}", id),
        Event::PrinterData { peer, text } => {
            debug!("Printer data from {:?} [size={}]", peer, text.len());
            if echo {
                print!("{}", text);
            }
        }
        Event::SnmpQuery { peer } => debug!("SNMP query from {:?}", peer),
    }
}

/// Stands in for a front end: logs every event and serves stdin commands.
/// Keeps draining events after stdin closes.
pub async fn run(store: Arc<JobStore>, mut events: mpsc::Receiver<Event>, echo: bool) -> Result<()> {
    let mut lines = Some(BufReader::new(stdin()).lines());

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(event) => log_event(&event, echo),
                None => return Ok(()),
            },
            line = async { lines.as_mut()?.next_line().await.transpose() }, if lines.is_some() => {
                let line = match line {
                    Some(Ok(line)) => line,
                    Some(Err(e)) => {
                        warn!("Failed to read console input; error = {}", e);
                        lines = None;
                        continue;
                    }
                    None => {
                        debug!("Console input closed");
                        lines = None;
                        continue;
                    }
                };
                if line.trim().is_empty() {
                    continue;
                }
                match line.parse::<Command>() {
                    Ok(command) => match execute(&store, command).await {
                        Ok(output) => println!("{}", output),
                        Err(e) => warn!("Command failed; error = {:#}", e),
                    },
                    Err(e) => println!("{}", e),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        event::EventSink,
        job::DeviceStatus,
    };

    #[test]
    fn parses_commands() {
        assert_eq!("new".parse::<Command>().unwrap(), Command::NewJob);
        assert_eq!("  history ".parse::<Command>().unwrap(), Command::History);
        assert_eq!(
            "show 2024-01-01_00-00-00".parse::<Command>().unwrap(),
            Command::Show("2024-01-01_00-00-00".into())
        );
        assert_eq!("status".parse::<Command>().unwrap(), Command::Status);
        assert!("show".parse::<Command>().is_err());
        assert!("new job".parse::<Command>().is_err());
        assert!("print".parse::<Command>().is_err());
    }

    #[tokio::test]
    async fn commands_drive_the_store() {
        let temp = tempfile::tempdir().unwrap();
        let (events, _rx) = EventSink::channel(16);
        let store = JobStore::open(temp.path(), events).await.unwrap();
        let first = store.current_job().await.id;
        store.append(b"hello printer").await.unwrap();

        assert_eq!(
            execute(&store, Command::History).await.unwrap(),
            "No archived jobs"
        );
        let started = execute(&store, Command::NewJob).await.unwrap();
        assert!(started.starts_with("Started job "));

        let history = execute(&store, Command::History).await.unwrap();
        assert!(history.starts_with(&first));
        assert!(history.contains("        13 bytes  "));

        assert_eq!(
            execute(&store, Command::Show(first)).await.unwrap(),
            "hello printer"
        );
        assert_eq!(
            execute(&store, Command::Show("nope".into())).await.unwrap(),
            "No job named nope"
        );
        assert_eq!(
            execute(&store, Command::Status).await.unwrap(),
            DeviceStatus::Idle.to_string()
        );
    }

    #[tokio::test]
    async fn new_command_completes_while_events_back_up() {
        let temp = tempfile::tempdir().unwrap();
        let (events, _rx) = EventSink::channel(1);
        let store = JobStore::open(temp.path(), events).await.unwrap();

        let output = tokio::time::timeout(
            std::time::Duration::from_secs(2),
            execute(&store, Command::NewJob),
        )
        .await
        .expect("`new` blocked on the event queue")
        .unwrap();
        assert!(output.starts_with("Started job "));
    }
}
