//! Raw access to one channel of an FTDI device.
//!
//! [`FtdiPort`] is everything the MPSSE transport needs from the chip. With the `nusb`
//! feature enabled, [`FtdiChannel`] implements it by speaking the FTDI SIO vendor
//! protocol: configuration goes through control requests addressed to the channel,
//! data through the channel's bulk endpoints.

use afe_globals::ftdi::{BitMode, FlowControl};
use std::time::Duration;

pub trait FtdiPort {
    /// Reset the serial engine of the channel.
    fn reset(&mut self) -> crate::Result<()>;
    fn set_bitmode(&mut self, mask: u8, mode: BitMode) -> crate::Result<()>;
    fn set_latency_timer(&mut self, ms: u8) -> crate::Result<()>;
    fn set_flow_control(&mut self, flow: FlowControl) -> crate::Result<()>;
    /// Per-I/O timeouts for [`FtdiPort::read`] and [`FtdiPort::write`].
    fn set_timeouts(&mut self, read: Duration, write: Duration) -> crate::Result<()>;
    /// Drop everything queued in both directions.
    fn purge(&mut self) -> crate::Result<()>;
    /// Queue `data` for the engine. Returns the number of bytes accepted.
    fn write(&mut self, data: &[u8]) -> crate::Result<usize>;
    /// Number of received bytes ready to be read.
    fn queue_status(&mut self) -> crate::Result<usize>;
    /// Read up to `len` received bytes.
    fn read(&mut self, len: usize) -> crate::Result<Vec<u8>>;
}

impl<P: FtdiPort + ?Sized> FtdiPort for Box<P> {
    fn reset(&mut self) -> crate::Result<()> {
        (**self).reset()
    }

    fn set_bitmode(&mut self, mask: u8, mode: BitMode) -> crate::Result<()> {
        (**self).set_bitmode(mask, mode)
    }

    fn set_latency_timer(&mut self, ms: u8) -> crate::Result<()> {
        (**self).set_latency_timer(ms)
    }

    fn set_flow_control(&mut self, flow: FlowControl) -> crate::Result<()> {
        (**self).set_flow_control(flow)
    }

    fn set_timeouts(&mut self, read: Duration, write: Duration) -> crate::Result<()> {
        (**self).set_timeouts(read, write)
    }

    fn purge(&mut self) -> crate::Result<()> {
        (**self).purge()
    }

    fn write(&mut self, data: &[u8]) -> crate::Result<usize> {
        (**self).write(data)
    }

    fn queue_status(&mut self) -> crate::Result<usize> {
        (**self).queue_status()
    }

    fn read(&mut self, len: usize) -> crate::Result<Vec<u8>> {
        (**self).read(len)
    }
}

#[cfg(feature = "nusb")]
pub use self::nusb_channel::{FtdiChannel, SioCommands};

#[cfg(feature = "nusb")]
mod nusb_channel {
    use super::FtdiPort;
    use crate::Error;
    use afe_globals::IO_TIMEOUT;
    use afe_globals::ftdi::{
        BitMode, Channel, FlowControl, MODEM_STATUS_LEN, SIO_RESET_REQUEST, SIO_RESET_SIO,
        SIO_SET_BITMODE_REQUEST, SIO_SET_FLOW_CTRL_REQUEST, SIO_SET_LATENCY_TIMER_REQUEST,
        SIO_TCIFLUSH, SIO_TCOFLUSH,
    };
    use nusb::transfer::{Buffer, Bulk, ControlOut, ControlType, In, Out, Recipient};
    use nusb::{Endpoint, Interface, MaybeFuture};
    use std::collections::VecDeque;
    use std::time::{Duration, Instant};

    const CONTROL_TIMEOUT: Duration = Duration::from_secs(1);

    /// SIO vendor requests of the FTDI chip.
    pub trait SioCommands {
        fn sio_request(&self, channel: Channel, request: u8, value: u16) -> crate::Result<()>;
        fn sio_reset(&self, channel: Channel, kind: u16) -> crate::Result<()>;
        fn sio_set_bitmode(&self, channel: Channel, mask: u8, mode: BitMode) -> crate::Result<()>;
        fn sio_set_latency_timer(&self, channel: Channel, ms: u8) -> crate::Result<()>;
        fn sio_set_flow_control(&self, channel: Channel, flow: FlowControl) -> crate::Result<()>;
    }

    impl SioCommands for Interface {
        fn sio_request(&self, channel: Channel, request: u8, value: u16) -> crate::Result<()> {
            let pkt = ControlOut {
                control_type: ControlType::Vendor,
                recipient: Recipient::Device,
                request,
                value,
                index: channel.sio_index(),
                data: &[],
            };
            log::trace!("sio request {request:#04x} value {value:#06x} on channel {channel:?}");
            Ok(self.control_out(pkt, CONTROL_TIMEOUT).wait()?)
        }

        fn sio_reset(&self, channel: Channel, kind: u16) -> crate::Result<()> {
            self.sio_request(channel, SIO_RESET_REQUEST, kind)
        }

        fn sio_set_bitmode(&self, channel: Channel, mask: u8, mode: BitMode) -> crate::Result<()> {
            let value = ((mode as u16) << 8) | mask as u16;
            self.sio_request(channel, SIO_SET_BITMODE_REQUEST, value)
        }

        fn sio_set_latency_timer(&self, channel: Channel, ms: u8) -> crate::Result<()> {
            if ms == 0 {
                return Err(Error::Argument("latency timer must be at least 1 ms"));
            }
            self.sio_request(channel, SIO_SET_LATENCY_TIMER_REQUEST, ms as u16)
        }

        fn sio_set_flow_control(&self, channel: Channel, flow: FlowControl) -> crate::Result<()> {
            self.sio_request(channel, SIO_SET_FLOW_CTRL_REQUEST, flow.value())
        }
    }

    /// One claimed channel of an FTDI device.
    pub struct FtdiChannel {
        interface: Interface,
        channel: Channel,
        ep_in: Endpoint<Bulk, In>,
        ep_out: Endpoint<Bulk, Out>,
        max_packet_size: usize,
        rx: VecDeque<u8>,
        read_timeout: Duration,
        write_timeout: Duration,
    }

    impl FtdiChannel {
        pub fn new(interface: Interface, channel: Channel) -> crate::Result<Self> {
            let ep_in = interface.endpoint::<Bulk, In>(channel.endpoint_in())?;
            let ep_out = interface.endpoint::<Bulk, Out>(channel.endpoint_out())?;
            let max_packet_size = ep_in.max_packet_size();
            log::debug!("[*] Init - channel {channel:?}, max packet size {max_packet_size}");
            Ok(Self {
                interface,
                channel,
                ep_in,
                ep_out,
                max_packet_size,
                rx: VecDeque::new(),
                read_timeout: IO_TIMEOUT,
                write_timeout: IO_TIMEOUT,
            })
        }

        pub fn channel(&self) -> Channel {
            self.channel
        }

        /// Wait for one bulk IN transfer and move its payload into the receive buffer.
        ///
        /// A transfer is always kept pending so that a timed out poll picks up the
        /// data on the next call.
        fn fill(&mut self, timeout: Duration) -> crate::Result<usize> {
            if self.ep_in.pending() == 0 {
                let buffer = self.ep_in.allocate(self.max_packet_size);
                self.ep_in.submit(buffer);
            }
            let Some(completion) = self.ep_in.wait_next_complete(timeout) else {
                return Ok(0);
            };
            completion.status?;
            let data = &completion.buffer[..completion.actual_len];
            let before = self.rx.len();
            // every packet starts with the two modem status bytes
            for packet in data.chunks(self.max_packet_size) {
                if packet.len() > MODEM_STATUS_LEN {
                    self.rx.extend(&packet[MODEM_STATUS_LEN..]);
                }
            }
            Ok(self.rx.len() - before)
        }

        fn drain_pending(&mut self) {
            self.ep_in.cancel_all();
            while self.ep_in.pending() > 0 {
                if self.ep_in.wait_next_complete(self.read_timeout).is_none() {
                    break;
                }
            }
        }
    }

    impl FtdiPort for FtdiChannel {
        fn reset(&mut self) -> crate::Result<()> {
            self.interface.sio_reset(self.channel, SIO_RESET_SIO)
        }

        fn set_bitmode(&mut self, mask: u8, mode: BitMode) -> crate::Result<()> {
            self.interface.sio_set_bitmode(self.channel, mask, mode)
        }

        fn set_latency_timer(&mut self, ms: u8) -> crate::Result<()> {
            self.interface.sio_set_latency_timer(self.channel, ms)
        }

        fn set_flow_control(&mut self, flow: FlowControl) -> crate::Result<()> {
            self.interface.sio_set_flow_control(self.channel, flow)
        }

        fn set_timeouts(&mut self, read: Duration, write: Duration) -> crate::Result<()> {
            self.read_timeout = read;
            self.write_timeout = write;
            Ok(())
        }

        fn purge(&mut self) -> crate::Result<()> {
            self.interface.sio_reset(self.channel, SIO_TCIFLUSH)?;
            self.interface.sio_reset(self.channel, SIO_TCOFLUSH)?;
            self.drain_pending();
            self.rx.clear();
            Ok(())
        }

        fn write(&mut self, data: &[u8]) -> crate::Result<usize> {
            log::trace!("BulkOut: {data:02x?}");
            self.ep_out.submit(Buffer::from(data.to_vec()));
            let Some(completion) = self.ep_out.wait_next_complete(self.write_timeout) else {
                self.ep_out.cancel_all();
                while self.ep_out.pending() > 0 {
                    if self.ep_out.wait_next_complete(self.write_timeout).is_none() {
                        break;
                    }
                }
                return Err(Error::Timeout);
            };
            completion.status?;
            Ok(completion.actual_len)
        }

        fn queue_status(&mut self) -> crate::Result<usize> {
            self.fill(Duration::from_millis(1))?;
            Ok(self.rx.len())
        }

        fn read(&mut self, len: usize) -> crate::Result<Vec<u8>> {
            let deadline = Instant::now() + self.read_timeout;
            while self.rx.len() < len {
                let now = Instant::now();
                if now >= deadline {
                    break;
                }
                self.fill(deadline - now)?;
            }
            let take = len.min(self.rx.len());
            let data: Vec<u8> = self.rx.drain(..take).collect();
            log::trace!("BulkIn:  {data:02x?}");
            Ok(data)
        }
    }

    impl Drop for FtdiChannel {
        fn drop(&mut self) {
            self.drain_pending();
        }
    }
}
