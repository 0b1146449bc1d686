//! Serves the pool actor over a line-oriented byte stream.

use operator_pool_engine::prelude::*;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

use crate::commands::{Command, Reply, Response};

/// Reads commands from `input` until it is exhausted or a `shutdown` command arrives, and writes
/// one response line per non-empty input line to `output`.
pub(crate) async fn serve<S, R, W>(
    actor: &PoolActor<S>,
    input: R,
    mut output: W,
) -> anyhow::Result<()>
where
    S: FeeSink + Send + Sync + 'static,
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = input.lines();

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let (response, stop) = match serde_json::from_str::<Command>(line) {
            Ok(Command::Shutdown) => (
                Response::Ok {
                    result: Reply::ShuttingDown {
                        shutting_down: true,
                    },
                },
                true,
            ),
            Ok(command) => {
                debug!(?command, "handling command");
                (handle(actor, command).await, false)
            }
            Err(e) => {
                warn!(%e, "malformed command");
                (Response::error(format!("malformed command: {e}")), false)
            }
        };

        let mut encoded = serde_json::to_vec(&response)?;
        encoded.push(b'\n');
        output.write_all(&encoded).await?;
        output.flush().await?;

        if stop {
            break;
        }
    }

    Ok(())
}

async fn handle<S>(actor: &PoolActor<S>, command: Command) -> Response
where
    S: FeeSink + Send + Sync + 'static,
{
    match command {
        Command::JoinPod {
            operator,
            pod,
            offered,
        } => actor
            .join_pod(operator, pod, offered)
            .await
            .map(Reply::Joined)
            .into(),
        Command::LeavePod { operator } => actor.leave_pod(operator).await.map(Reply::Left).into(),
        Command::Withdraw { operator } => actor
            .withdraw(operator)
            .await
            .map(|amount| Reply::Amount { amount })
            .into(),
        Command::PublishJob { request, ctx } => match actor.publish_job(request, ctx).await {
            Ok(job_id) => Response::Ok {
                result: Reply::Published {
                    job_id,
                    job: actor.job(&job_id).await,
                },
            },
            Err(e) => Response::error(e),
        },
        Command::Finalize {
            job_id,
            operator,
            report,
            now,
        } => actor
            .finalize(job_id, operator, report, now)
            .await
            .map(Reply::Finalized)
            .into(),
        Command::AbandonJob { job_id, now } => actor
            .abandon_job(job_id, now)
            .await
            .map(Reply::Abandoned)
            .into(),
        Command::PreviewBond { pod, position } => actor
            .preview_bond(pod, position)
            .await
            .map(|amount| Reply::Amount { amount })
            .into(),
        Command::RequiredBond { pod } => actor
            .required_bond(pod)
            .await
            .map(|amount| Reply::Amount { amount })
            .into(),
        Command::JobStatus { job_id, now } => {
            actor.job_status(&job_id, now).await.map(Reply::Status).into()
        }
        Command::Balance { operator } => actor.balance(&operator).await.map(Reply::Balance).into(),
        Command::Shutdown => Response::Ok {
            result: Reply::ShuttingDown {
                shutting_down: true,
            },
        },
    }
}

#[cfg(test)]
mod tests {
    use operator_pool_params::prelude::PoolParams;
    use serde_json::Value;

    use super::*;

    async fn run(input: &str) -> Vec<Value> {
        let pool = OperatorPool::new(PoolParams::default(), RecordingSink::new()).unwrap();
        let actor = PoolActor::spawn(pool);

        let mut output = Vec::new();
        serve(&actor, input.as_bytes(), &mut output).await.unwrap();

        String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn answers_every_command_in_order() {
        let operator = "0x0101010101010101010101010101010101010101";
        let input = format!(
            r#"{{"op":"required_bond","pod":1}}

{{"op":"join_pod","operator":"{operator}","pod":0,"offered":"100"}}
{{"op":"balance","operator":"{operator}"}}
not json
{{"op":"leave_pod","operator":"0x0202020202020202020202020202020202020202"}}
"#
        );

        let responses = run(&input).await;
        assert_eq!(responses.len(), 5, "blank lines are skipped");

        assert_eq!(responses[0]["status"], "ok");
        assert_eq!(responses[0]["result"]["amount"], "200");

        assert_eq!(responses[1]["result"]["position"], 1);
        assert_eq!(responses[2]["result"]["bonded"], "100");

        assert_eq!(responses[3]["status"], "error");
        assert!(responses[3]["error"]
            .as_str()
            .unwrap()
            .starts_with("malformed command"));

        assert_eq!(responses[4]["status"], "error");
        assert!(responses[4]["error"]
            .as_str()
            .unwrap()
            .contains("is not in any pod"));
    }

    #[tokio::test]
    async fn published_jobs_are_returned() {
        let operator = "0x0101010101010101010101010101010101010101";
        let input = format!(
            r#"{{"op":"join_pod","operator":"{operator}","pod":0,"offered":"100"}}
{{"op":"publish_job","request":{{"payload":"00ff","gas_limit":21000,"max_gas_price":10,"block_time_allowance":30}},"ctx":{{"nonce":1,"block_number":1,"block_timestamp":500,"prior_block_hash":"{hash}"}}}}
"#,
            hash = format!("0x{}", "11".repeat(32)),
        );

        let responses = run(&input).await;
        assert_eq!(responses.len(), 2);

        let published = &responses[1]["result"];
        assert_eq!(responses[1]["status"], "ok", "{published}");
        assert!(published["job"].is_object(), "the job must be readable right after publishing");
        assert_eq!(published["job"]["primary"], operator);
        assert_eq!(published["job"]["payload"], "00ff");
    }

    #[tokio::test]
    async fn stops_at_shutdown() {
        let responses = run(
            r#"{"op":"shutdown"}
{"op":"required_bond","pod":0}
"#,
        )
        .await;

        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0]["result"]["shutting_down"], true);
    }
}
