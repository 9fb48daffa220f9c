use clap::Parser;
use sqprogress::config::{ProgressArgs, ProgressConfig};
use sqprogress::layout::scan_queue_dirs;
use sqprogress::reconcile::reconcile;
use sqprogress::report::ProgressReport;
use sqprogress::{analyze_job, attribute_job, ProgressError};
use std::process::ExitCode;

fn run(args: &ProgressArgs) -> Result<(), ProgressError> {
    let config = ProgressConfig::from_args(args)?;
    let job = &config.job;
    tracing::info!(
        jobset = %job.jobset,
        graph = %job.graph,
        total = %job.total_cases,
        stride = job.stride,
        "scanning progress"
    );

    let progress = analyze_job(job, &config.layout, config.log_max_lines);
    let queue = scan_queue_dirs(&config.layout, &job.jobset);

    let attribution = config
        .worker_breakdown
        .then(|| attribute_job(&progress, &config.layout, config.log_max_lines));
    let logs = attribution
        .as_ref()
        .map(|a| (a, reconcile(&progress, a)));

    let report = ProgressReport::new(&progress, queue, logs);
    if config.json {
        println!("{}", report.to_json()?);
    } else {
        print!("{}", report.render_text());
    }
    Ok(())
}

fn main() -> ExitCode {
    sqprogress::init_tracing("sqprogress");
    let args = ProgressArgs::parse();

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("[sqprogress] error: {}", e);
            ExitCode::from(2)
        }
    }
}
