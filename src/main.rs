use clap::Parser;
use gophermart::application::accrual::AccrualClient;
use gophermart::application::dispatcher::Dispatcher;
use gophermart::application::service::LoyaltyService;
use gophermart::config::Config;
use gophermart::domain::ports::LedgerStoreRef;
use gophermart::domain::user::UserId;
use gophermart::error::LoyaltyError;
use gophermart::infrastructure::clock::TokioSleeper;
use gophermart::infrastructure::http::HttpAccrualTransport;
use gophermart::infrastructure::in_memory::InMemoryLedgerStore;
#[cfg(feature = "storage-rocksdb")]
use gophermart::infrastructure::rocksdb::RocksDBStore;
use gophermart::interfaces::csv::balance_writer::BalanceWriter;
use gophermart::interfaces::csv::submission_reader::{Submission, SubmissionReader, SubmissionType};
use gophermart::logging::init_logging;
use miette::{IntoDiagnostic, Result};
use std::collections::HashMap;
use std::fs::File;
use std::io;
use std::sync::Arc;
use tracing::{info, warn};

fn open_store(config: &Config) -> Result<LedgerStoreRef> {
    match &config.db_path {
        #[cfg(feature = "storage-rocksdb")]
        Some(path) => Ok(Arc::new(RocksDBStore::open(path).into_diagnostic()?)),
        #[cfg(not(feature = "storage-rocksdb"))]
        Some(_) => Err(miette::miette!(
            "--db-path requires building with the storage-rocksdb feature"
        )),
        None => Ok(Arc::new(InMemoryLedgerStore::new())),
    }
}

/// Users in the order they first appear in the batch.
#[derive(Default)]
struct Users {
    order: Vec<String>,
    ids: HashMap<String, UserId>,
}

impl Users {
    async fn resolve(
        &mut self,
        service: &LoyaltyService,
        submission: &Submission,
    ) -> gophermart::error::Result<UserId> {
        if let Some(id) = self.ids.get(&submission.login) {
            return Ok(*id);
        }
        let id = match service
            .register(&submission.login, &submission.password)
            .await
        {
            Err(LoyaltyError::Exists) => {
                service
                    .login(&submission.login, &submission.password)
                    .await?
            }
            other => other?,
        };
        self.order.push(submission.login.clone());
        self.ids.insert(submission.login.clone(), id);
        Ok(id)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::parse();
    init_logging(&config.log_level);

    let store = open_store(&config)?;
    let transport = HttpAccrualTransport::new(&config.accrual_address, config.request_timeout())
        .into_diagnostic()?;
    let client = AccrualClient::new(Arc::new(transport), Arc::new(TokioSleeper));
    let dispatcher = Arc::new(
        Dispatcher::new(store.clone(), client).with_poll_interval(config.poll_interval()),
    );
    let service = LoyaltyService::new(store, dispatcher.clone());

    // Orders are submitted (and start reconciling) as they are read;
    // withdrawals wait until reconciliation is over.
    let file = File::open(&config.input).into_diagnostic()?;
    let mut users = Users::default();
    let mut withdrawals = Vec::new();
    for row in SubmissionReader::new(file).submissions() {
        let submission = match row {
            Ok(submission) => submission,
            Err(e) => {
                eprintln!("Error reading submission: {}", e);
                continue;
            }
        };
        let user_id = match users.resolve(&service, &submission).await {
            Ok(id) => id,
            Err(e) => {
                eprintln!("Error authenticating {}: {}", submission.login, e);
                continue;
            }
        };
        match submission.r#type {
            SubmissionType::Order => {
                if let Err(e) = service.submit_order(user_id, &submission.order).await {
                    eprintln!("Error submitting order {}: {}", submission.order, e);
                }
            }
            SubmissionType::Withdraw => withdrawals.push((user_id, submission)),
        }
    }

    let interrupt = tokio::spawn({
        let dispatcher = dispatcher.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupted, cancelling reconciliation");
                if let Err(e) = dispatcher.cancel() {
                    warn!(error = %e, "failed to cancel reconciliation");
                }
            }
        }
    });
    info!(orders = dispatcher.in_flight(), "waiting for reconciliation");
    service.drain().await.into_diagnostic()?;
    service.shutdown().await.into_diagnostic()?;
    interrupt.abort();

    for (user_id, submission) in withdrawals {
        let Some(amount) = submission.amount else {
            eprintln!("Error processing withdrawal {}: missing amount", submission.order);
            continue;
        };
        if let Err(e) = service.withdraw(user_id, &submission.order, amount).await {
            eprintln!("Error processing withdrawal {}: {}", submission.order, e);
        }
    }

    let mut balances = Vec::with_capacity(users.order.len());
    for login in &users.order {
        let balance = service.balance(users.ids[login]).await.into_diagnostic()?;
        balances.push((login.as_str(), balance));
    }

    let stdout = io::stdout();
    let mut writer = BalanceWriter::new(stdout.lock());
    writer.write_balances(balances).into_diagnostic()?;

    Ok(())
}
