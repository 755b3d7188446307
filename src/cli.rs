// Copyright 2025 Lablup Inc. and Jeongkyu Shin
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "sshrun",
    version,
    about = "Drive a remote shell over SSH as a request/response protocol",
    long_about = "sshrun opens an interactive shell on a remote host, learns its prompt and then runs\ncommands one at a time, returning each command's output once the prompt comes back.\nOn top of that it lists, downloads, uploads and deletes files with nothing but ls, cat\nand scp on the remote side, forwards local TCP ports, and records traffic for offline replay.",
    after_help = "EXAMPLES:\n  Run a command:             sshrun run web01 -- uname -a\n  Wait for custom output:    sshrun run db -t 'ready$' -- ./start.sh\n  List a directory:          sshrun ls admin@web01:2222 /var/log\n  Download a file:           sshrun get web01 /etc/hosts ./hosts\n  Upload a file:             sshrun put web01 ./app.tar.gz /opt/app/\n  Forward a port:            sshrun forward web01 -L 127.0.0.1:5432 db.internal:5432\n  Record, then replay:       sshrun --record ./rec run web01 -- df -h\n                             sshrun --replay ./rec run web01 -- df -h"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(
        long,
        global = true,
        help = "Configuration file path\nWithout it ./sshrun.yaml, then the user config directory (~/.config/sshrun/config.yaml) are tried"
    )]
    pub config: Option<PathBuf>,

    #[arg(short = 'u', long, global = true, help = "Username for the SSH connection")]
    pub user: Option<String>,

    #[arg(
        short = 'i',
        long,
        global = true,
        help = "SSH private key file path\nFalls back to the configured key, then ~/.ssh/id_ed25519, id_ecdsa, id_rsa"
    )]
    pub identity: Option<PathBuf>,

    #[arg(
        short = 'A',
        long = "use-agent",
        global = true,
        help = "Authenticate with the SSH agent (SSH_AUTH_SOCK)"
    )]
    pub use_agent: bool,

    #[arg(
        long,
        global = true,
        env = "SSHRUN_PASSWORD",
        hide_env_values = true,
        help = "Password authentication"
    )]
    pub password: Option<String>,

    #[arg(
        long,
        global = true,
        env = "SSHRUN_KEY_PASSPHRASE",
        hide_env_values = true,
        help = "Passphrase of an encrypted private key"
    )]
    pub passphrase: Option<String>,

    #[arg(
        long,
        global = true,
        help = "Idle timeout for each remote command in seconds (overrides config)"
    )]
    pub timeout: Option<u64>,

    #[arg(
        long,
        global = true,
        value_name = "DIR",
        help = "Record every command and transfer into DIR for later replay"
    )]
    pub record: Option<PathBuf>,

    #[arg(
        long,
        global = true,
        value_name = "DIR",
        conflicts_with = "record",
        help = "Answer from a recording in DIR instead of connecting"
    )]
    pub replay: Option<PathBuf>,

    #[arg(
        short = 'v',
        long,
        action = ArgAction::Count,
        global = true,
        help = "Verbose mode (-v, -vv, -vvv)"
    )]
    pub verbose: u8,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(
        about = "Run a command in a remote shell and print its output",
        long_about = "Opens a shell on the host, learns its prompt, runs the command and prints what it\nwrote before the prompt returned. Anything written to stderr makes the command fail.\nA command that stays silent for the idle timeout returns what it printed so far.",
        after_help = "Terminators:\n  ^text   output starts with text\n  text$   output ends with text\n  text    output contains text"
    )]
    Run {
        #[arg(help = "Host in [user@]hostname[:port] format or a name from the config")]
        host: String,

        #[arg(
            short = 't',
            long = "terminator",
            help = "Finish when the output matches this pattern instead of the prompt (repeatable)"
        )]
        terminators: Vec<String>,

        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },

    #[command(about = "List a remote directory or file")]
    Ls {
        host: String,

        #[arg(default_value = ".")]
        path: String,
    },

    #[command(about = "Download a remote file")]
    Get {
        host: String,

        remote: String,

        #[arg(help = "Local destination (defaults to the remote file name)")]
        local: Option<PathBuf>,
    },

    #[command(
        about = "Upload a local file",
        long_about = "Uploads a file with scp. A destination ending in '/' receives the local file name.\nMissing parent directories are created."
    )]
    Put {
        host: String,

        local: PathBuf,

        remote: String,
    },

    #[command(about = "Delete a remote file or directory (recursively)")]
    Rm { host: String, remote: String },

    #[command(
        about = "Forward a local TCP port to an address reachable from the host",
        after_help = "Example:\n  sshrun forward bastion -L 127.0.0.1:8080 intranet.local:80"
    )]
    Forward {
        host: String,

        #[arg(
            short = 'L',
            long = "local",
            default_value = "127.0.0.1:0",
            help = "Local listen address"
        )]
        local: String,

        #[arg(help = "Remote target as host:port, resolved on the remote side")]
        remote: String,
    },
}

impl Commands {
    pub fn host(&self) -> &str {
        match self {
            Commands::Run { host, .. }
            | Commands::Ls { host, .. }
            | Commands::Get { host, .. }
            | Commands::Put { host, .. }
            | Commands::Rm { host, .. }
            | Commands::Forward { host, .. } => host,
        }
    }
}
