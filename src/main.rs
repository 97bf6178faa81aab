// Copyright 2025 RustFS Team
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

use clap::{Parser, Subcommand};
use operator::config::OperatorConfig;
use shadow_rs::shadow;
use tracing::info;

shadow!(build);

#[derive(Parser)]
#[command(name = "quarks-sts")]
#[command(version = build::PKG_VERSION)]
#[command(about = "Quarks StatefulSet Kubernetes Operator CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Output CRDs in YAML
    Crd {
        /// Optional output path. If not set, the output will be written to stdout.
        #[arg(short, long)]
        file: Option<String>,
    },

    /// Output the mutating webhook configuration in YAML
    WebhookConfig {
        /// Optional output path. If not set, the output will be written to stdout.
        #[arg(short, long)]
        file: Option<String>,

        #[command(flatten)]
        config: OperatorConfig,
    },

    /// Run the controllers and the admission webhooks
    Server {
        #[command(flatten)]
        config: OperatorConfig,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Crd { file } => operator::crd(file).await?,
        Commands::WebhookConfig { file, config } => operator::webhook_config(&config, file).await?,
        Commands::Server { config } => {
            operator::init_tracing();
            info!(
                "quarks-sts {} (commit {}, built {})",
                build::PKG_VERSION,
                build::SHORT_COMMIT,
                build::BUILD_TIME
            );
            operator::run(config).await?
        }
    }

    Ok(())
}
