use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::driver::{DhcpResults, IpClient};
use crate::machine::{Message, MessageSender};

use super::interface::{DeviceDetails, device_details};
use super::{Worker, post};

const ADDRESS_POLL_ATTEMPTS: u32 = 5;
const ADDRESS_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Waits for NetworkManager's DHCP client to put an address on the interface.
pub struct NmcliIpClient {
    worker: Worker,
    sender: MessageSender,
    generation: Arc<AtomicU64>,
}

impl NmcliIpClient {
    pub fn new(sender: MessageSender, worker: Worker) -> Self {
        Self {
            worker,
            sender,
            generation: Arc::new(AtomicU64::new(0)),
        }
    }
}

impl IpClient for NmcliIpClient {
    fn start_provisioning(&mut self, interface: &str) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let current = self.generation.clone();
        let sender = self.sender.clone();
        let interface = interface.to_string();

        self.worker.submit(move || {
            for attempt in 1..=ADDRESS_POLL_ATTEMPTS {
                if current.load(Ordering::SeqCst) != generation {
                    debug!(%interface, "provisioning cancelled");
                    return;
                }
                match device_details(&interface) {
                    Ok(details) => {
                        if let Some(results) = dhcp_results(&details) {
                            info!(%interface, ip = %results.ip_address, "address acquired");
                            if current.load(Ordering::SeqCst) == generation {
                                post(&sender, Message::IpProvisioningSuccess(results));
                            }
                            return;
                        }
                    }
                    Err(e) => debug!(%interface, attempt, error = %e, "device query failed"),
                }
                thread::sleep(ADDRESS_POLL_INTERVAL);
            }

            warn!(%interface, "no address after {ADDRESS_POLL_ATTEMPTS} attempts");
            if current.load(Ordering::SeqCst) == generation {
                post(&sender, Message::IpProvisioningFailure);
            }
        });
    }

    fn stop(&mut self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }
}

fn dhcp_results(details: &DeviceDetails) -> Option<DhcpResults> {
    Some(DhcpResults {
        ip_address: details.ip_address.clone()?,
        gateway: details.gateway.clone(),
        dns_servers: details.dns_servers.clone(),
        lease_duration_secs: details.lease_duration_secs,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn results_need_an_address() {
        let mut details = DeviceDetails {
            gateway: Some("192.168.1.1".to_string()),
            ..Default::default()
        };
        assert!(dhcp_results(&details).is_none());

        details.ip_address = Some("192.168.1.20/24".to_string());
        details.lease_duration_secs = Some(3600);
        let results = dhcp_results(&details).unwrap();
        assert_eq!(results.ip_address, "192.168.1.20/24");
        assert_eq!(results.gateway.as_deref(), Some("192.168.1.1"));
        assert_eq!(results.lease_duration_secs, Some(3600));
    }
}
