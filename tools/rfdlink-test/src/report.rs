// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Console rendering of link test statistics.

use colored::*;
use rfdlink::{ReceiverReport, Report, SenderReport};

pub fn print_final(report: &Report) {
    println!();
    match report {
        Report::Sender(s) => print_sender(s),
        Report::Receiver(r) => print_receiver(r),
    }
    println!();
}

fn print_sender(report: &SenderReport) {
    println!("{}", "=== RFD900 Link Test (sender) ===".bold());
    println!();
    println!("  {} {}", "Number of sent frames:".cyan(), report.frames_sent);
    println!("  {} {}", "Bytes sent:".cyan(), report.bytes_sent);
    if let Some(seq) = report.last_sequence {
        println!("  {} {}", "Last sequence number:".cyan(), seq);
    }
    println!(
        "  {} {:.1}s ({:.0} bit/s)",
        "Duration:".cyan(),
        report.elapsed.as_secs_f64(),
        report.bit_rate()
    );
}

fn print_receiver(report: &ReceiverReport) {
    println!("{}", "=== RFD900 Link Test (receiver) ===".bold());
    println!();
    println!(
        "  {} {}",
        "Number of received frames:".cyan(),
        report.frames_received
    );
    println!(
        "  {} {} ({})",
        "Number of missed frames:".cyan(),
        report.frames_missed,
        loss_label(report.loss_percent())
    );
    println!("  {} {:.1}s", "Duration:".cyan(), report.elapsed.as_secs_f64());
    println!();
    println!("{}", "--- Anomalies ---".dimmed());
    println!("  {} {}", "Duplicates:".yellow(), report.duplicates);
    println!("  {} {}", "Out of order:".yellow(), report.out_of_order);
    println!("  {} {}", "Payload errors:".yellow(), report.payload_errors);
    println!(
        "  {} {} ({} bytes discarded)",
        "Corrupt frames:".yellow(),
        report.corrupt_frames,
        report.bytes_discarded
    );
    if let (Some(first), Some(last)) = (report.first_sequence, report.last_sequence) {
        println!();
        println!("{}", "--- Sequence ---".dimmed());
        println!("  {} {}", "First:".white(), first);
        println!("  {} {}", "Last:".white(), last);
    }
}

/// One-line running receiver statistics.
pub fn print_progress(report: &Report) {
    if let Some(r) = report.as_receiver() {
        eprintln!(
            "{} received={} missed={} corrupt={} {}",
            "...".dimmed(),
            r.frames_received,
            r.frames_missed,
            r.corrupt_frames,
            loss_label(r.loss_percent())
        );
    }
}

fn loss_label(percent: f64) -> ColoredString {
    let text = format!("{:.2}% loss", percent);
    if percent == 0.0 {
        text.green()
    } else if percent < 5.0 {
        text.yellow()
    } else {
        text.red()
    }
}
