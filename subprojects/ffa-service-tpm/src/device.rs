//! TPM device on top of the CRB and the TPM service.

use core::ptr::NonNull;

use ffa_msg::{InterruptHandler, Messenger, NullHandler};
use ffa_svc::{Error, Result, raw::Conduit};

use crate::{
    TpmService,
    crb::{
        CONTROL_REQUEST_COMMAND_READY, CONTROL_REQUEST_GO_IDLE, CONTROL_STATUS_FATAL_ERROR, Crb,
        CrbRegisters, InterfaceType,
    },
    proto::StartQualifier,
};

/// Locality used for every request.
const LOCALITY: u8 = 0;

/// Platform configuration of the TPM device.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeviceConfig {
    /// Address of the CRB shared with the TPM service partition. Zero when the platform has
    /// no TPM.
    pub crb_base: usize,
}

/// A TPM reached through a CRB and the FF-A TPM service.
pub struct Tpm2Device<'m, C, H = NullHandler> {
    service: TpmService<'m, C, H>,
    crb: Crb,
    interface: InterfaceType,
    idle_bypass: bool,
}

impl<'m, C: Conduit, H: InterruptHandler> Tpm2Device<'m, C, H> {
    /// Brings up the device.
    ///
    /// Runs the FF-A version preflight, then reads the interface id of the CRB at
    /// `config.crb_base` once. Only the CRB interface is supported.
    ///
    /// # Safety
    ///
    /// A non-zero `config.crb_base` must be the address of the TPM's CRB, mapped for the
    /// lifetime of the device and not accessed by anything else.
    pub unsafe fn new(messenger: &'m Messenger<C, H>, config: DeviceConfig) -> Result<Self> {
        let service = TpmService::connect(messenger)?;

        // An unconfigured CRB means the device was never set up for use, hence `NotReady`.
        let Some(regs) = NonNull::new(config.crb_base as *mut CrbRegisters) else {
            log::error!("no TPM CRB address configured");
            return Err(Error::NotReady);
        };

        // SAFETY: upheld by the caller.
        let crb = unsafe { Crb::new(regs) };

        let id = crb.interface_id();
        let interface = match InterfaceType::from_raw(id.interface_type()) {
            Some(InterfaceType::Crb) => InterfaceType::Crb,
            other => {
                log::error!("unsupported TPM interface {other:?} ({:#x})", id.interface_type());
                return Err(Error::NotSupported);
            }
        };

        let idle_bypass = id.cap_crb_idle_bypass();
        log::debug!("TPM CRB at {:#x}, idle bypass {idle_bypass}", crb.base());

        Ok(Self {
            service,
            crb,
            interface,
            idle_bypass,
        })
    }

    /// Returns the TPM service client.
    #[inline]
    pub fn service(&self) -> &TpmService<'m, C, H> {
        &self.service
    }

    /// Returns the interface type read at bring-up.
    #[inline]
    pub fn interface_type(&self) -> InterfaceType {
        self.interface
    }

    /// Returns `true` if the TPM accepts commands straight from the idle state.
    #[inline]
    pub fn idle_bypass(&self) -> bool {
        self.idle_bypass
    }

    /// Requests locality 0.
    ///
    /// Fails with [`Error::AccessDenied`] if the TPM does not grant it.
    pub fn request_use_tpm(&self) -> Result<()> {
        self.crb.request_locality();
        self.service.start(StartQualifier::Locality, LOCALITY)?;

        if !self.crb.locality_granted() {
            log::error!("TPM locality {LOCALITY} not granted");
            return Err(Error::AccessDenied);
        }

        Ok(())
    }

    /// Executes `command` and copies the response into `response`.
    ///
    /// Returns the response length. If `response` is too short, nothing is copied and
    /// [`Error::BufferTooSmall`] reports the response length. The TPM is moved back to idle
    /// whether the command succeeded or not.
    pub fn submit_command(&self, command: &[u8], response: &mut [u8]) -> Result<usize> {
        let result = self.execute(command, response);
        let idle = self.control_request(CONTROL_REQUEST_GO_IDLE);

        let len = result?;
        idle?;
        Ok(len)
    }

    fn execute(&self, command: &[u8], response: &mut [u8]) -> Result<usize> {
        if !self.idle_bypass {
            self.control_request(CONTROL_REQUEST_COMMAND_READY)?;
        }

        self.crb.write_command(command)?;
        self.crb.start();
        self.service.start(StartQualifier::Command, LOCALITY)?;

        if self.crb.start_pending() {
            log::error!("TPM did not consume the command");
            return Err(Error::DeviceError);
        }
        if self.crb.control_status() & CONTROL_STATUS_FATAL_ERROR != 0 {
            log::error!("TPM reported a fatal error");
            return Err(Error::DeviceError);
        }

        let len = self.crb.response_len()?;
        let Some(out) = response.get_mut(..len) else {
            return Err(Error::BufferTooSmall { required: len });
        };
        self.crb.read_data(out);

        Ok(len)
    }

    /// Issues a control area request and checks that the TPM acted on it.
    fn control_request(&self, bits: u32) -> Result<()> {
        self.crb.request(bits);
        self.service.start(StartQualifier::Command, LOCALITY)?;

        if self.crb.pending_requests() & bits != 0 {
            log::error!("TPM ignored control request {bits:#x}");
            return Err(Error::DeviceError);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use core::cell::{Cell, RefCell};

    use ffa_msg::DirectMessage;
    use ffa_svc::{
        code,
        misc::Version,
        partition::DESCRIPTOR_SIZE,
        raw::Regs,
        testing::{FnConduit, success},
    };

    use super::*;
    use crate::{
        crb::{
            CONTROL_START, CONTROL_STATUS_IDLE, DATA_BUFFER_OFFSET, LOCALITY_CONTROL_REQUEST_ACCESS,
            LOCALITY_STATUS_GRANTED,
        },
        proto::{CMD_START, SERVICE_ID, status},
    };

    const OWN_ID: u16 = 0x8001;
    const TPM_ID: u16 = 0x8003;

    /// `interface_id` of a CRB interface without idle bypass.
    const CRB: u32 = 0x1;
    /// `interface_id` of a CRB interface with idle bypass.
    const CRB_IDLE_BYPASS: u32 = 0x1 | (1 << 9);

    /// TPM2_Startup(CLEAR).
    const STARTUP: [u8; 12] = [0x80, 0x01, 0, 0, 0, 0x0c, 0, 0, 0x01, 0x44, 0, 0];
    /// A success response with two bytes of parameters.
    const RESPONSE: [u8; 12] = [0x80, 0x01, 0, 0, 0, 0x0c, 0, 0, 0, 0, 0xab, 0xcd];

    /// A CRB page on the heap, released on drop.
    struct CrbPage(NonNull<CrbRegisters>);

    impl CrbPage {
        fn new(interface_id: u32) -> Self {
            // SAFETY: every field is an integer or an integer array.
            let regs = unsafe { Box::<CrbRegisters>::new_zeroed().assume_init() };
            let page = Self(NonNull::from(Box::leak(regs)));
            page.with(|r| {
                r.interface_id = interface_id;
                r.control_status = CONTROL_STATUS_IDLE;
            });
            page
        }

        fn config(&self) -> DeviceConfig {
            DeviceConfig {
                crb_base: self.0.as_ptr() as usize,
            }
        }

        fn with<T>(&self, f: impl FnOnce(&mut CrbRegisters) -> T) -> T {
            // SAFETY: the page is live and no reference to it outlives this call.
            f(unsafe { &mut *self.0.as_ptr() })
        }
    }

    impl Drop for CrbPage {
        fn drop(&mut self) {
            // SAFETY: allocated by `Box` in `CrbPage::new`.
            drop(unsafe { Box::from_raw(self.0.as_ptr()) });
        }
    }

    /// The TPM service partition, acting on the CRB when started.
    struct Peer<'a> {
        page: &'a CrbPage,
        version: u32,
        consume: bool,
        fatal: bool,
        grant: bool,
        starts: RefCell<Vec<u64>>,
        commands: RefCell<Vec<Vec<u8>>>,
    }

    impl<'a> Peer<'a> {
        fn new(page: &'a CrbPage) -> Self {
            Self {
                page,
                version: Version::CURRENT.to_raw(),
                consume: true,
                fatal: false,
                grant: true,
                starts: RefCell::new(Vec::new()),
                commands: RefCell::new(Vec::new()),
            }
        }

        fn answer(&self, req: Regs) -> Regs {
            match req.function_id() {
                code::VERSION => Regs::new(self.version),
                code::ID_GET => success(&[0, OWN_ID as u64]),
                code::PARTITION_INFO_GET_REGS => {
                    let [lo, hi] = SERVICE_ID.to_wire();
                    let meta = (DESCRIPTOR_SIZE as u64) << 48;
                    success(&[0, meta, TPM_ID as u64, lo, hi])
                }
                code::MSG_SEND_DIRECT_REQ2 => {
                    let msg = DirectMessage::decode(&req).expect("decode");
                    assert_eq!(msg.args[0], CMD_START);
                    self.starts.borrow_mut().push(msg.args[1]);
                    self.start(msg.args[1]);

                    let mut args = [0; 14];
                    args[0] = status::OK;
                    let rsp = DirectMessage::extended_response(
                        msg.destination,
                        msg.source,
                        msg.service_id,
                        args,
                    );
                    rsp.encode()
                }
                fid => panic!("unexpected call {fid:#010x}"),
            }
        }

        fn start(&self, qualifier: u64) {
            self.page.with(|r| {
                if qualifier == StartQualifier::Locality as u64 {
                    if self.grant && r.locality_control & LOCALITY_CONTROL_REQUEST_ACCESS != 0 {
                        r.locality_status = LOCALITY_STATUS_GRANTED;
                    }
                    return;
                }

                if r.control_request & CONTROL_REQUEST_COMMAND_READY != 0 {
                    r.control_request = 0;
                    r.control_status &= !CONTROL_STATUS_IDLE;
                }
                if r.control_request & CONTROL_REQUEST_GO_IDLE != 0 {
                    r.control_request = 0;
                    r.control_status |= CONTROL_STATUS_IDLE;
                }
                if r.control_start & CONTROL_START != 0 && self.consume {
                    let len = u32::from_be_bytes(r.data_buffer[2..6].try_into().unwrap());
                    self.commands
                        .borrow_mut()
                        .push(r.data_buffer[..len as usize].to_vec());
                    r.data_buffer[..RESPONSE.len()].copy_from_slice(&RESPONSE);
                    r.control_start = 0;
                    if self.fatal {
                        r.control_status |= CONTROL_STATUS_FATAL_ERROR;
                    }
                }
            });
        }
    }

    #[test]
    fn test_new_without_crb_address_is_not_ready() {
        let conduit = FnConduit::new(|req: Regs| {
            assert_eq!(req.function_id(), code::VERSION);
            Regs::new(Version::CURRENT.to_raw())
        });
        let messenger = Messenger::new(&conduit);

        // SAFETY: no CRB is accessed.
        let device = unsafe { Tpm2Device::new(&messenger, DeviceConfig::default()) };

        assert!(matches!(device, Err(Error::NotReady)));
    }

    #[test]
    fn test_new_rejects_incompatible_version() {
        let page = CrbPage::new(CRB);
        let mut peer = Peer::new(&page);
        peer.version = 0x0001_0001;
        let conduit = FnConduit::new(|req: Regs| peer.answer(req));
        let messenger = Messenger::new(&conduit);

        // SAFETY: `page` outlives the device.
        let device = unsafe { Tpm2Device::new(&messenger, page.config()) };

        assert!(matches!(device, Err(Error::NotSupported)));
    }

    #[test]
    fn test_new_rejects_non_crb_interfaces() {
        for interface_id in [0x0, 0xF, 0x2] {
            let page = CrbPage::new(interface_id);
            let peer = Peer::new(&page);
            let conduit = FnConduit::new(|req: Regs| peer.answer(req));
            let messenger = Messenger::new(&conduit);

            // SAFETY: `page` outlives the device.
            let device = unsafe { Tpm2Device::new(&messenger, page.config()) };

            assert!(matches!(device, Err(Error::NotSupported)), "{interface_id:#x}");
        }
    }

    #[test]
    fn test_new_caches_interface() {
        let page = CrbPage::new(CRB_IDLE_BYPASS);
        let peer = Peer::new(&page);
        let conduit = FnConduit::new(|req: Regs| peer.answer(req));
        let messenger = Messenger::new(&conduit);

        // SAFETY: `page` outlives the device.
        let device = unsafe { Tpm2Device::new(&messenger, page.config()) }.expect("device");

        assert_eq!(device.interface_type(), InterfaceType::Crb);
        assert!(device.idle_bypass());
        // The interface is not read again.
        page.with(|r| r.interface_id = 0);
        assert!(device.idle_bypass());
    }

    #[test]
    fn test_submit_command() {
        let page = CrbPage::new(CRB);
        let peer = Peer::new(&page);
        let conduit = FnConduit::new(|req: Regs| peer.answer(req));
        let messenger = Messenger::new(&conduit);
        // SAFETY: `page` outlives the device.
        let device = unsafe { Tpm2Device::new(&messenger, page.config()) }.expect("device");

        let mut response = [0u8; 64];
        let len = device.submit_command(&STARTUP, &mut response);

        assert_eq!(len, Ok(RESPONSE.len()));
        assert_eq!(response[..RESPONSE.len()], RESPONSE);
        assert_eq!(*peer.commands.borrow(), vec![STARTUP.to_vec()]);
        // command ready, execute, go idle
        assert_eq!(*peer.starts.borrow(), vec![0, 0, 0]);

        let base = page.config().crb_base as u64;
        page.with(|r| {
            assert_ne!(r.control_status & CONTROL_STATUS_IDLE, 0);
            assert_eq!(r.control_response_address, base + DATA_BUFFER_OFFSET as u64);
        });
    }

    #[test]
    fn test_submit_command_with_idle_bypass() {
        let page = CrbPage::new(CRB_IDLE_BYPASS);
        let peer = Peer::new(&page);
        let conduit = FnConduit::new(|req: Regs| peer.answer(req));
        let messenger = Messenger::new(&conduit);
        // SAFETY: `page` outlives the device.
        let device = unsafe { Tpm2Device::new(&messenger, page.config()) }.expect("device");

        let mut response = [0u8; 12];

        assert_eq!(device.submit_command(&STARTUP, &mut response), Ok(12));
        // execute, go idle
        assert_eq!(peer.starts.borrow().len(), 2);
    }

    #[test]
    fn test_submit_command_short_buffer() {
        let page = CrbPage::new(CRB);
        let peer = Peer::new(&page);
        let conduit = FnConduit::new(|req: Regs| peer.answer(req));
        let messenger = Messenger::new(&conduit);
        // SAFETY: `page` outlives the device.
        let device = unsafe { Tpm2Device::new(&messenger, page.config()) }.expect("device");

        let mut response = [0u8; 8];

        assert_eq!(
            device.submit_command(&STARTUP, &mut response),
            Err(Error::BufferTooSmall { required: 12 })
        );
        assert_eq!(response, [0; 8]);
        page.with(|r| assert_ne!(r.control_status & CONTROL_STATUS_IDLE, 0));
    }

    #[test]
    fn test_submit_command_not_consumed() {
        let page = CrbPage::new(CRB_IDLE_BYPASS);
        let mut peer = Peer::new(&page);
        peer.consume = false;
        let conduit = FnConduit::new(|req: Regs| peer.answer(req));
        let messenger = Messenger::new(&conduit);
        // SAFETY: `page` outlives the device.
        let device = unsafe { Tpm2Device::new(&messenger, page.config()) }.expect("device");

        let mut response = [0u8; 64];

        assert_eq!(
            device.submit_command(&STARTUP, &mut response),
            Err(Error::DeviceError)
        );
    }

    #[test]
    fn test_submit_command_fatal_error() {
        let page = CrbPage::new(CRB_IDLE_BYPASS);
        let mut peer = Peer::new(&page);
        peer.fatal = true;
        let conduit = FnConduit::new(|req: Regs| peer.answer(req));
        let messenger = Messenger::new(&conduit);
        // SAFETY: `page` outlives the device.
        let device = unsafe { Tpm2Device::new(&messenger, page.config()) }.expect("device");

        let mut response = [0u8; 64];

        assert_eq!(
            device.submit_command(&STARTUP, &mut response),
            Err(Error::DeviceError)
        );
    }

    #[test]
    fn test_request_use_tpm() {
        let page = CrbPage::new(CRB);
        let peer = Peer::new(&page);
        let conduit = FnConduit::new(|req: Regs| peer.answer(req));
        let messenger = Messenger::new(&conduit);
        // SAFETY: `page` outlives the device.
        let device = unsafe { Tpm2Device::new(&messenger, page.config()) }.expect("device");

        assert_eq!(device.request_use_tpm(), Ok(()));
        assert_eq!(*peer.starts.borrow(), vec![StartQualifier::Locality as u64]);
    }

    #[test]
    fn test_request_use_tpm_denied() {
        let page = CrbPage::new(CRB);
        let mut peer = Peer::new(&page);
        peer.grant = false;
        let conduit = FnConduit::new(|req: Regs| peer.answer(req));
        let messenger = Messenger::new(&conduit);
        // SAFETY: `page` outlives the device.
        let device = unsafe { Tpm2Device::new(&messenger, page.config()) }.expect("device");

        assert_eq!(device.request_use_tpm(), Err(Error::AccessDenied));
    }

    #[test]
    fn test_binding_resolved_on_first_command() {
        let page = CrbPage::new(CRB_IDLE_BYPASS);
        let peer = Peer::new(&page);
        let calls = Cell::new(0usize);
        let conduit = FnConduit::new(|req: Regs| {
            calls.set(calls.get() + 1);
            peer.answer(req)
        });
        let messenger = Messenger::new(&conduit);
        // SAFETY: `page` outlives the device.
        let device = unsafe { Tpm2Device::new(&messenger, page.config()) }.expect("device");
        assert_eq!(calls.get(), 1);

        device.request_use_tpm().expect("first");
        device.request_use_tpm().expect("second");

        // version, id query, partition query, two starts
        assert_eq!(calls.get(), 5);
        assert_eq!(
            device.service().binding().map(|b| b.partition_id),
            Ok(TPM_ID)
        );
    }
}
