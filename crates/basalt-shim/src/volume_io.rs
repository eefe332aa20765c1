//! Translates one shim request into exactly one call against the mounted
//! `Volume`: reads and writes go straight to sector I/O, never buffered
//! beyond the span of the single request being served.

use std::sync::{Arc, Mutex};

use basalt_core::Volume;

use crate::protocol::{Request, Response};

pub type SharedVolume = Arc<Mutex<Volume>>;

pub fn handle_request(volume: &SharedVolume, request: Request) -> Response {
    let mut volume = volume.lock().expect("volume mutex poisoned");
    match request {
        Request::SizeQuery => Response::Size(volume.size()),
        Request::SectorSizeQuery => Response::SectorSize(volume.sector_size()),
        Request::Read { offset, len } => {
            let mut buf = vec![0u8; len as usize];
            match volume.read(offset, &mut buf) {
                Ok(()) => Response::Data(buf),
                Err(e) => Response::Error(e.to_string()),
            }
        }
        Request::Write { offset, data } => match volume.write(offset, &data) {
            Ok(()) => Response::Ack,
            Err(e) => Response::Error(e.to_string()),
        },
        Request::Flush => match volume.flush() {
            Ok(()) => Response::Ack,
            Err(e) => Response::Error(e.to_string()),
        },
        // Handled by the engine's accept loop before it ever reaches here;
        // kept as a legal request value so the wire format has a clean
        // shutdown message distinct from a dropped connection.
        Request::Shutdown => Response::Ack,
    }
}
