use mumbler::prelude::*;
use tokio::io::{AsyncBufReadExt, BufReader};

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

const HELP: &str = "\
commands:
  /join <group>          join a group
  /leave <group>         leave a group
  /whisper <user>        open a private chat
  /close <user>          close a private chat
  /pm <user> <text>      send a private message
  /groups                list groups
  /users                 list connected users
  /quit                  disconnect and exit
anything else is sent to the first joined group";

enum Command<'a> {
    Join(GroupId),
    Leave(GroupId),
    Whisper(ClientId),
    Close(ClientId),
    Pm(ClientId, &'a str),
    Groups,
    Users,
    Quit,
    Say(&'a str),
}

fn parse(line: &str) -> Result<Command<'_>, String> {
    let Some(rest) = line.strip_prefix('/') else {
        return Ok(Command::Say(line));
    };
    let (name, args) = rest.split_once(' ').unwrap_or((rest, ""));
    let args = args.trim();
    let id = |s: &str| {
        s.parse::<u16>()
            .map_err(|_| format!("expected a numeric id, got {s:?}"))
    };

    match name {
        "join" => Ok(Command::Join(GroupId(id(args)?))),
        "leave" => Ok(Command::Leave(GroupId(id(args)?))),
        "whisper" => Ok(Command::Whisper(ClientId(id(args)?))),
        "close" => Ok(Command::Close(ClientId(id(args)?))),
        "pm" => {
            let (to, text) = args
                .split_once(' ')
                .ok_or_else(|| "usage: /pm <user> <text>".to_string())?;
            Ok(Command::Pm(ClientId(id(to)?), text))
        }
        "groups" => Ok(Command::Groups),
        "users" => Ok(Command::Users),
        "quit" => Ok(Command::Quit),
        other => Err(format!("unknown command /{other}\n{HELP}")),
    }
}

/// Runs one command. Returns `false` when the user wants to leave.
fn execute(client: &MumblerClient, command: Command<'_>) -> bool {
    let result = match command {
        Command::Join(group) => client.join_group(group),
        Command::Leave(group) => client.leave_group(group),
        Command::Whisper(user) => {
            match client.whisper(user) {
                Some(chat) => println!("* whispering with {}", chat.remote.name),
                None => println!("* {user} is not connected"),
            }
            Ok(())
        }
        Command::Close(user) => {
            if !client.close_whisper(user) {
                println!("* no open whisper with {user}");
            }
            Ok(())
        }
        Command::Pm(user, text) => client.send_private_message(user, text),
        Command::Groups => {
            let joined = client.joined_groups();
            for group in client.groups() {
                let mark = if joined.iter().any(|j| j.id == group.id) {
                    "*"
                } else {
                    " "
                };
                println!(
                    "{mark} {} {:<20} owner {} members {}",
                    group.id,
                    group.name,
                    group.owner_id,
                    group.members.len()
                );
            }
            Ok(())
        }
        Command::Users => {
            for user in client.connected_users() {
                println!("  {} {}", user.id, user.name);
            }
            Ok(())
        }
        Command::Quit => return false,
        Command::Say(text) => match client.joined_groups().first() {
            Some(group) => client.send_group_message(group.id, text),
            None => {
                println!("* join a group first (/groups, /join <id>)");
                Ok(())
            }
        },
    };
    if let Err(e) = result {
        println!("* {e}");
    }
    true
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<(), MumblerError> {
    mumbler::init_tracing();

    let mut args = std::env::args().skip(1);
    let (Some(endpoint), Some(username)) = (args.next(), args.next()) else {
        eprintln!("usage: chat-cli <host:port> <username>");
        std::process::exit(2);
    };

    let client = MumblerClient::builder().build()?;
    let me = client.login(&endpoint, &username).await?;
    println!("* logged in as {username} ({me})\n{HELP}");

    // Session events.
    let mut events = client.subscribe_events();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                SessionEvent::Disconnected => println!("* connection lost"),
                SessionEvent::Kicked { group_id } => {
                    println!("* you were kicked from {group_id}")
                }
                SessionEvent::Typing {
                    client_id,
                    group_id,
                } => tracing::debug!(%client_id, %group_id, "typing"),
                other => tracing::debug!(?other, "session event"),
            }
        }
    });

    // Both message logs.
    let mut group_log = client.group_messages();
    tokio::spawn(async move {
        loop {
            let entry = group_log.next().await;
            if let Some(group) = entry.group_id {
                println!("[{group}] {}: {}", entry.sender_name, entry.text);
            }
        }
    });
    let mut private_log = client.private_messages();
    tokio::spawn(async move {
        loop {
            let entry = private_log.next().await;
            println!("[pm] {}: {}", entry.sender_name, entry.text);
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match parse(line) {
            Ok(command) => {
                if !execute(&client, command) {
                    break;
                }
            }
            Err(message) => println!("* {message}"),
        }
    }

    client.disconnect();
    Ok(())
}
