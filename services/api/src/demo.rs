use chrono::{DateTime, Duration, Local, NaiveDate, Utc};
use clap::Args;

use debtflow::config::BillingConfig;
use debtflow::error::AppError;
use debtflow::workflows::escalation::DealReference;
use debtflow::workflows::notification::{Channel, DrainSummary};
use debtflow::workflows::reconciliation::{
    ClinicId, ContractRecord, DelinquencySnapshot, InstallmentRecord, PatientRecord,
};

use crate::infra::{parse_date, CollectionService};

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Date the walkthrough starts on (YYYY-MM-DD). Defaults to today.
    #[arg(long, value_parser = parse_date)]
    pub(crate) start: Option<NaiveDate>,
    /// Skip the old-debt escalation portion of the demo.
    #[arg(long)]
    pub(crate) skip_escalation: bool,
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let start = args.start.unwrap_or_else(|| Local::now().date_naive());
    let day0 = noon(start);

    let billing = BillingConfig::default();
    let threshold_days = billing.escalation_threshold_days;
    let service = CollectionService::new(billing)?;
    let clinic = ClinicId("demo-clinic".to_string());
    service
        .deals
        .register("98765432100", DealReference("deal-1042".to_string()));

    println!("Debtflow collection walkthrough");
    println!("===============================");
    println!("Clinic: {} | start date: {start}", clinic.0);
    println!();

    // Day 0: the nightly sync lands one fresh delinquency and one debt that
    // has been open for months.
    println!("[day 0] syncing delinquency snapshots from the billing source");
    let batch = seed_batch(start, false);
    let (sync, planning) = service.sync(&clinic, &batch, day0)?;
    println!(
        "  sync: {} processed, {} created, {} failed",
        sync.processed, sync.created, sync.failed
    );
    println!(
        "  planning: {} contacts scheduled",
        planning.scheduled
    );
    println!();

    // Ana has an email on file and gets the step 0 message; Bruno does not,
    // so his attempt fails permanently and will re-enter step 0.
    println!("[day 0] first notification run (step 0 goes out by email)");
    render_run(&service.run_notifications(day0)?);
    println!();

    // Each resolved step already queued its follow-up, so a resync an hour
    // later has nothing to add.
    let (_, replanned) = service.sync(&clinic, &batch, day0 + Duration::hours(1))?;
    println!(
        "[day 0] resync an hour later: {} contract(s) already have a live follow-up",
        replanned.already_pending
    );
    println!();

    // Day 2: Ana pays. The resync flips the received flag, and the SMS that
    // was queued for day 7 gets cancelled instead of sent.
    println!("[day 2] payment posts for the fresh debt; resyncing");
    let (paid_sync, _) = service.sync(&clinic, &seed_batch(start, true), day0 + Duration::days(2))?;
    println!("  sync: {} field(s) written", paid_sync.fields_written);
    println!();

    let day8 = day0 + Duration::days(8);
    println!("[day 8] notification run after the cooldown");
    render_run(&service.run_notifications(day8)?);
    println!();

    if !args.skip_escalation {
        println!("[day 8] escalation sweep (threshold: {threshold_days} days overdue)");
        let summary = service.escalate(day8)?;
        println!(
            "  {} scanned, {} case(s) opened, {} already open, {} lookup failures",
            summary.scanned, summary.created, summary.skipped_existing, summary.lookup_failures
        );
        for case in service.cases.all() {
            let linkage = case
                .deal_reference
                .as_ref()
                .map(|reference| reference.0.as_str())
                .unwrap_or("unlinked");
            println!(
                "    case {} -> installment {} ({} cents, deal: {linkage})",
                case.id, case.installment_id, case.amount_cents
            );
        }
        println!();
    }

    println!("Contact history");
    println!("---------------");
    for entry in service.history.all() {
        let outcome = if entry.success {
            "sent".to_string()
        } else {
            format!("failed: {}", entry.error.as_deref().unwrap_or("unknown"))
        };
        println!(
            "  {} | step {} via {} | {}",
            entry.sent_at.format("%Y-%m-%d %H:%M"),
            entry.step,
            entry.channel,
            outcome
        );
    }

    Ok(())
}

fn noon(date: NaiveDate) -> DateTime<Utc> {
    date.and_hms_opt(12, 0, 0)
        .map(|naive| naive.and_utc())
        .unwrap_or_else(Utc::now)
}

fn render_run(summaries: &[(Channel, DrainSummary)]) {
    let mut any = false;
    for (channel, summary) in summaries {
        if summary.processed == 0 {
            continue;
        }
        any = true;
        println!(
            "  {channel}: {} processed, {} sent, {} cancelled, {} retried, {} failed",
            summary.processed, summary.sent, summary.cancelled, summary.retried, summary.failed
        );
    }
    if !any {
        println!("  nothing was due");
    }
}

/// Two debtors: Ana is freshly overdue and walks the contact ladder; Bruno's
/// debt is months old and is headed for a collection case.
fn seed_batch(start: NaiveDate, ana_paid: bool) -> Vec<DelinquencySnapshot> {
    vec![
        DelinquencySnapshot {
            patient: PatientRecord {
                external_id: "pt-ana".to_string(),
                name: "Ana Souza".to_string(),
                email: Some("ana@example.com".to_string()),
                phone: Some("+5511999990000".to_string()),
                tax_id: Some("12345678901".to_string()),
            },
            contracts: vec![ContractRecord {
                external_id: "ct-ana-1".to_string(),
                active: true,
                installments: vec![InstallmentRecord {
                    sequence: 3,
                    due_date: start - Duration::days(20),
                    amount_cents: 18_500,
                    received: ana_paid,
                }],
            }],
        },
        DelinquencySnapshot {
            patient: PatientRecord {
                external_id: "pt-bruno".to_string(),
                name: "Bruno Lima".to_string(),
                email: None,
                phone: Some("+5511888880000".to_string()),
                tax_id: Some("98765432100".to_string()),
            },
            contracts: vec![ContractRecord {
                external_id: "ct-bruno-1".to_string(),
                active: true,
                installments: vec![InstallmentRecord {
                    sequence: 1,
                    due_date: start - Duration::days(120),
                    amount_cents: 92_000,
                    received: false,
                }],
            }],
        },
    ]
}
