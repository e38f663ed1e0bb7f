use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use shared::{
    domain::{InterviewId, UserId},
    protocol::CreateInterviewRequest,
};
use storage::Storage;

#[derive(Parser, Debug)]
struct Cli {
    #[arg(long, default_value = "sqlite://./data/prepwise.db")]
    database_url: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    CreateUser {
        name: String,
        email: String,
    },
    CreateInterview {
        user_id: String,
        role: String,
        #[arg(long = "type", default_value = "Technical")]
        interview_type: String,
        #[arg(long, default_value = "Junior")]
        level: String,
        /// Comma-separated technologies.
        #[arg(long, value_delimiter = ',')]
        techstack: Vec<String>,
        #[arg(long = "question")]
        questions: Vec<String>,
        #[arg(long)]
        finalized: bool,
    },
    ShowFeedback {
        interview_id: String,
        user_id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let storage = Storage::new(&cli.database_url).await?;

    match cli.command {
        Command::CreateUser { name, email } => {
            let user = storage.upsert_user(&name, &email).await?;
            println!("user_id={}", user.id);
        }
        Command::CreateInterview {
            user_id,
            role,
            interview_type,
            level,
            techstack,
            questions,
            finalized,
        } => {
            let user_id = UserId::new(user_id);
            if storage.user_by_id(&user_id).await?.is_none() {
                bail!("unknown user {user_id}");
            }
            let interview = storage
                .create_interview(&CreateInterviewRequest {
                    user_id,
                    role,
                    interview_type,
                    level,
                    techstack,
                    questions,
                    finalized,
                })
                .await?;
            println!("interview_id={}", interview.id);
        }
        Command::ShowFeedback {
            interview_id,
            user_id,
        } => {
            let feedback = storage
                .feedback_by_interview(&InterviewId::new(interview_id), &UserId::new(user_id))
                .await?;
            match feedback {
                Some(feedback) => println!("{}", serde_json::to_string_pretty(&feedback)?),
                None => println!("no feedback recorded"),
            }
        }
    }

    Ok(())
}
