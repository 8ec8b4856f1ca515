//! Long-lived dispatcher: one planner drives one engine process.
//!
//! The conversation is `INIT` (full parameter block, answered with `OKAY`)
//! followed by any mix of `PING` and `PRED` frames until `QUIT`. There are
//! no recoverable errors: a bad frame terminates the session.

use std::io::{Read, Write};

use crate::{
    kernel::Kernel,
    params::Params,
    plan::Plan,
    prelude::*,
    protocol::{Command, Decoder, Encoder, ProtocolError},
};

pub struct Session<R, W> {
    decoder: Decoder<R>,
    encoder: Encoder<W>,
}

impl<R: Read, W: Write> Session<R, W> {
    pub const fn new(reader: R, writer: W) -> Self {
        Self { decoder: Decoder::new(reader), encoder: Encoder::new(writer) }
    }

    pub fn serve(&mut self) -> Result<(), ProtocolError> {
        self.decoder.expect_command(Command::INIT)?;
        let params = Params::decode(&mut self.decoder)?;
        self.decoder.expect_command(Command::DONE)?;
        self.encoder.write_command(Command::OKAY)?;
        self.encoder.flush()?;
        info!(
            forecast_minutes = params.forecast_minutes,
            minutes_now = params.minutes_now,
            num_cars = params.cars.count,
            "session initialized",
        );

        loop {
            let command = self.decoder.read_command()?;
            match &command.0 {
                b"QUIT" => {
                    info!("session closed");
                    return Ok(());
                }
                b"PING" => {
                    self.encoder.write_command(Command::PONG)?;
                    self.encoder.flush()?;
                }
                b"PRED" => {
                    let plan = Plan::decode(&mut self.decoder)?;
                    let prediction = Kernel::new(&params, &plan).run();
                    debug!(
                        final_metric = prediction.final_metric,
                        final_soc = prediction.final_soc,
                        soc_min = prediction.soc_min,
                        first_charge_soc = prediction.first_charge_soc,
                        clipped_kwh = prediction.clipped_kwh,
                        "predicted",
                    );
                    prediction.encode(&mut self.encoder)?;
                    self.encoder.flush()?;
                }
                _ => return Err(ProtocolError::UnknownCommand(command)),
            }
        }
    }
}
