use crate::calibrate::hog;
use crate::config::Config;
use crate::connection::Connection;
use crate::error::Result;
use crate::protocol::{Command, Message, read_message, write_message};
use crate::stats::TimingSamples;
use std::time::Duration;
use tracing::{debug, info, trace};

/// What a finished run hands to the measurement sink.
#[derive(Debug)]
pub struct RunReport {
    pub samples: TimingSamples,
    pub responses: Vec<Message>,
    pub failed: usize,
}

/// Issues `repeat` synchronous requests over one connection.
pub struct Driver<'a> {
    conn: &'a mut Connection,
    command: Command,
    delay_ms: i32,
    repeat: u32,
    busy_units: u64,
    poll: Option<Duration>,
    poll_limit: Option<u32>,
    verbose: bool,
}

impl<'a> Driver<'a> {
    pub fn new(conn: &'a mut Connection, config: &Config, units_per_ms: u64) -> Self {
        Self {
            conn,
            command: config.command,
            delay_ms: config.delay_ms,
            repeat: config.repeat,
            busy_units: config.async_ms.saturating_mul(units_per_ms),
            poll: config.poll,
            poll_limit: config.poll_limit,
            verbose: config.verbose,
        }
    }

    pub async fn run(mut self) -> Result<RunReport> {
        let repeat = self.repeat as usize;
        let mut samples = TimingSamples::with_capacity(repeat);
        let mut responses = Vec::with_capacity(repeat);
        let mut failed = 0;

        info!(
            "Sending {} {:?} requests to {}",
            self.repeat,
            self.command,
            self.conn.peer()
        );

        for i in 0..self.repeat {
            samples.sample();

            let remaining = self.repeat.saturating_sub(i).min(i32::MAX as u32) as i32;
            let request = Message::request(self.command, self.delay_ms, remaining);
            let response = self.round_trip(&request).await?;

            if response.status != 0 {
                failed += 1;
            }
            if self.verbose {
                info!("status: {}", response.status);
            }
            responses.push(response);
        }

        debug!("Run finished, {} non-zero statuses", failed);
        Ok(RunReport {
            samples,
            responses,
            failed,
        })
    }

    async fn round_trip(&mut self, request: &Message) -> Result<Message> {
        write_message(self.conn.stream_mut(), request).await?;

        if self.busy_units > 0 {
            hog(self.busy_units);
        }

        if let Some(timeout) = self.poll {
            let rounds = self.conn.wait_readable(timeout, self.poll_limit).await?;
            trace!(rounds, "response readable");
        }

        read_message(self.conn.stream_mut()).await
    }
}
