//! Rohde & Schwarz network analyzer driver (SCPI over TCP).
//!
//! Connects to the instrument's raw SCPI socket (port 5025), defines one
//! S-parameter trace on the configured channel, and runs a single
//! synchronized sweep per sample. The stimulus frequency axis is read once
//! at connect time; every sample pairs it with the fresh response trace.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tracing::info;

use crate::core::{Measurement, Sampler};

/// Upper bound on a single query round-trip, sweep time included.
const SCPI_TIMEOUT: Duration = Duration::from_secs(30);

/// SCPI session with a vector network analyzer.
pub struct VnaAnalyzer {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    channel: u32,
    frequencies: Vec<f64>,
}

impl VnaAnalyzer {
    /// Connect and configure one trace for `s_parameter` (e.g. `"S21"`)
    /// on `channel`.
    pub async fn connect(host: &str, port: u16, channel: u32, s_parameter: &str) -> Result<Self> {
        let stream = TcpStream::connect((host, port))
            .await
            .with_context(|| format!("cannot connect to VNA at {host}:{port}"))?;
        let (read_half, write_half) = stream.into_split();

        let mut vna = Self {
            reader: BufReader::new(read_half),
            writer: write_half,
            channel,
            frequencies: Vec::new(),
        };

        let identity = vna.query("*IDN?").await.context("instrument did not identify")?;
        info!(instrument = %identity, "connection established");

        vna.command(&format!(
            "CALC{channel}:PAR:SDEF 'Trc1','{s_parameter}'"
        ))
        .await?;
        vna.command(&format!("CALC{channel}:PAR:SEL 'Trc1'")).await?;
        vna.command("FORM ASCII").await?;
        vna.command(&format!("INIT{channel}:CONT OFF")).await?;

        vna.frequencies = vna
            .query_floats(&format!("CALC{channel}:DATA:STIM?"))
            .await
            .context("failed to read the stimulus axis")?;

        Ok(vna)
    }

    async fn command(&mut self, command: &str) -> Result<()> {
        self.writer
            .write_all(format!("{command}\n").as_bytes())
            .await
            .with_context(|| format!("failed to send '{command}'"))
    }

    async fn query(&mut self, command: &str) -> Result<String> {
        self.command(command).await?;
        let mut line = String::new();
        tokio::time::timeout(SCPI_TIMEOUT, self.reader.read_line(&mut line))
            .await
            .map_err(|_| anyhow!("no response to '{command}' within {SCPI_TIMEOUT:?}"))?
            .with_context(|| format!("read failed for '{command}'"))?;
        Ok(line.trim().to_string())
    }

    async fn query_floats(&mut self, command: &str) -> Result<Vec<f64>> {
        let response = self.query(command).await?;
        response
            .split(',')
            .map(|field| {
                field
                    .trim()
                    .parse::<f64>()
                    .with_context(|| format!("bad numeric field '{field}' in response to '{command}'"))
            })
            .collect()
    }
}

#[async_trait]
impl Sampler for VnaAnalyzer {
    async fn sample(&mut self) -> Result<Measurement> {
        let channel = self.channel;

        // Trigger one sweep and block on its completion.
        let complete = self.query(&format!("INIT{channel}:IMM; *OPC?")).await?;
        if complete != "1" {
            bail!("unexpected sweep-complete response: {complete}");
        }

        let values = self
            .query_floats(&format!("CALC{channel}:DATA? FDAT"))
            .await?;
        if values.is_empty() {
            bail!("analyzer returned an empty trace");
        }

        Ok(Measurement::Trace {
            frequencies: self.frequencies.clone(),
            values,
            unit: "dB".to_string(),
        })
    }
}
