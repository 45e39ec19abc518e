//! A simulated SDMMC controller with one card behind it.
//!
//! Commands execute synchronously when CMD is written, so every flag the
//! driver polls for is already raised by the time it reads STA.

#![allow(dead_code)]

use std::{
    collections::{HashMap, VecDeque},
    sync::{
        Arc, Condvar, Mutex, MutexGuard,
        atomic::{AtomicBool, AtomicU32, Ordering},
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use stm32_sdmmc::{
    Sdmmc, SdmmcConfig, Worker,
    constants::*,
    osa::{CacheOps, DmaOps, Osa, PowerOps, ScratchBlock},
    regs::*,
    transfer::IrqHandler,
};

pub const RCA: u16 = 0xb368;

/// 8 GB SDHC card, C_SIZE 0x3b37.
pub const SDHC_CSD: [u32; 4] = [0x0a40_4000, 0x3b37_7f80, 0x5b59_0000, 0x400e_0032];
pub const CID: [u32; 4] = [0x7801_5301, 0x8012_3456, 0x5530_3847, 0x0353_4453];
/// SD 2.00, 1 and 4 bit bus.
pub const SCR: u64 = 0x0235_8000_0000_0000;

const R1_READY: u32 = 1 << 8;
const R1_APP_CMD: u32 = 1 << 5;
const R1_ILLEGAL_COMMAND: u32 = 1 << 22;

const STATE_IDLE: u32 = 0;
const STATE_READY: u32 = 1;
const STATE_IDENT: u32 = 2;
const STATE_STBY: u32 = 3;
const STATE_TRAN: u32 = 4;
const STATE_DATA: u32 = 5;
const STATE_RCV: u32 = 6;

pub fn set_field(raw: &mut [u32; 4], start: u32, end: u32, value: u32) {
    for bit in start..=end {
        let word = (bit / 32) as usize;
        let mask = 1 << (bit % 32);
        if (value >> (bit - start)) & 1 != 0 {
            raw[word] |= mask;
        } else {
            raw[word] &= !mask;
        }
    }
}

/// CSD version 1.0: 1001 * 512 * 512 bytes.
pub fn sdsc_csd() -> [u32; 4] {
    let mut raw = [0u32; 4];
    set_field(&mut raw, 96, 103, 0x32);
    set_field(&mut raw, 80, 83, 9);
    set_field(&mut raw, 62, 73, 1000);
    set_field(&mut raw, 47, 49, 7);
    raw
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardModel {
    /// High capacity, answers CMD8.
    Sdhc,
    /// Standard capacity, answers CMD8.
    Sdsc,
    /// Standard capacity from before CMD8 existed.
    LegacySdsc,
    /// One I/O function, no memory.
    Sdio,
    /// Empty slot: nothing answers.
    Absent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOp {
    Clean(usize, usize),
    Invalidate(usize, usize),
}

enum Reply {
    None,
    Short(u32),
    Long([u32; 4]),
    Busy(u32),
    Timeout,
}

pub struct Card {
    pub model: CardModel,
    state: u32,
    rca: u16,
    app_cmd: bool,
    /// ACMD41 polls answered busy before the card is ready.
    pub busy_rounds: u32,
    busy_left: u32,
    /// Offers 1.8V signalling.
    pub s18a: bool,
    /// DAT0 stays low after the voltage switch.
    pub d0_sticks: bool,
    /// Supports DDR50 in function group 1.
    pub ddr50: bool,
    /// Answer to CMD8 instead of the echoed argument.
    pub cmd8_reply: Option<u32>,
    /// Flags ILLEGAL_COMMAND in the CMD55 after a command it ignored.
    pub reports_illegal: bool,
    illegal_pending: bool,
    /// Answers CMD55 without setting APP_CMD.
    pub refuses_app_cmd: bool,
    switch_pending: bool,
    access_mode: u32,
    pub cccr: [u8; SDIO_CCCR_SIZE],
    blocks: HashMap<u64, [u8; SD_BLOCK_SIZE]>,
}

impl Card {
    fn new(model: CardModel) -> Self {
        let mut cccr = [0u8; SDIO_CCCR_SIZE];
        cccr[0] = 0x43;
        cccr[SDIO_CCCR_SPEED as usize] = SDIO_SPEED_SHS;
        Self {
            model,
            state: STATE_IDLE,
            rca: 0,
            app_cmd: false,
            busy_rounds: 2,
            busy_left: 2,
            s18a: false,
            d0_sticks: false,
            ddr50: false,
            cmd8_reply: None,
            reports_illegal: false,
            illegal_pending: false,
            refuses_app_cmd: false,
            switch_pending: false,
            access_mode: 0,
            cccr,
            blocks: HashMap::new(),
        }
    }

    fn power_off(&mut self) {
        self.state = STATE_IDLE;
        self.rca = 0;
        self.app_cmd = false;
        self.illegal_pending = false;
        self.busy_left = self.busy_rounds;
        self.switch_pending = false;
        self.access_mode = 0;
    }

    fn is_hc(&self) -> bool {
        self.model == CardModel::Sdhc
    }

    fn status(&self) -> u32 {
        (self.state << 9) | R1_READY
    }

    fn csd(&self) -> [u32; 4] {
        match self.model {
            CardModel::Sdhc => SDHC_CSD,
            _ => sdsc_csd(),
        }
    }

    fn lba(&self, arg: u32) -> u64 {
        if self.is_hc() {
            arg as u64
        } else {
            arg as u64 / SD_BLOCK_SIZE as u64
        }
    }

    fn switch_status(&mut self, arg: u32) -> [u8; SD_SWITCH_STATUS_LEN] {
        let mut fg1 = 0x8003u16;
        if self.ddr50 {
            fg1 |= 1 << SD_FG1_DDR50;
        }
        let fg4 = 0x8003u16;

        let select = |req: u32, support: u16, current: u32| -> u32 {
            if req == 0xf {
                current
            } else if support & (1 << req) != 0 {
                req
            } else {
                0xf
            }
        };
        let sel1 = select(arg & 0xf, fg1, self.access_mode);
        let sel4 = select((arg >> 12) & 0xf, fg4, 0);
        if arg & (1 << 31) != 0 && sel1 != 0xf {
            self.access_mode = sel1;
        }

        let mut raw = [0u8; SD_SWITCH_STATUS_LEN];
        raw[0..2].copy_from_slice(&200u16.to_be_bytes());
        raw[6..8].copy_from_slice(&fg4.to_be_bytes());
        raw[12..14].copy_from_slice(&fg1.to_be_bytes());
        raw[15] = (sel4 as u8) << 4;
        raw[16] = sel1 as u8;
        raw
    }
}

pub struct Sim {
    pub card: Card,
    sta: u32,
    busy: bool,
    d0_low: bool,
    power: u32,
    clkcr: u32,
    arg: u32,
    respcmd: u32,
    resp: [u32; 4],
    dtimer: u32,
    dlen: u32,
    dctrl: u32,
    dcount: u32,
    mask: u32,
    idmactrl: u32,
    idmabase: u32,
    fifo: VecDeque<u32>,

    pub commands: Vec<(u8, u32)>,
    pub supply_mv: u32,
    pub io_mv: u32,
    /// Supply rail refuses every non-zero request.
    pub supply_broken: bool,
    pub controller_resets: u32,
    pub cache_ops: Vec<CacheOp>,
    /// Error flags raised instead of DATAEND by the next data command.
    pub inject_data_error: Option<Status>,
    pub overlapping_transfers: u32,
    data_active: bool,
    /// The next this many commands get no response.
    pub mute_responses: u32,
    /// The next response fails its CRC check.
    pub corrupt_response: bool,
    /// The next response echoes the wrong command index.
    pub misroute_response: bool,
    pub delays: Vec<u32>,
    scratch_claimed: bool,
    /// The scratch block handed out lies outside the DMA window.
    pub scratch_unreachable: bool,

    mappings: Vec<(usize, usize, u32)>,
    next_bus: u32,
    unreachable: Vec<(usize, usize)>,
}

impl Sim {
    fn new(model: CardModel) -> Self {
        Self {
            card: Card::new(model),
            sta: 0,
            busy: false,
            d0_low: false,
            power: 0,
            clkcr: 0,
            arg: 0,
            respcmd: 0,
            resp: [0; 4],
            dtimer: 0,
            dlen: 0,
            dctrl: 0,
            dcount: 0,
            mask: 0,
            idmactrl: 0,
            idmabase: 0,
            fifo: VecDeque::new(),
            commands: Vec::new(),
            supply_mv: 0,
            io_mv: 0,
            supply_broken: false,
            controller_resets: 0,
            cache_ops: Vec::new(),
            inject_data_error: None,
            overlapping_transfers: 0,
            data_active: false,
            mute_responses: 0,
            corrupt_response: false,
            misroute_response: false,
            delays: Vec::new(),
            scratch_claimed: false,
            scratch_unreachable: false,
            mappings: Vec::new(),
            next_bus: 0x8000_0000,
            unreachable: Vec::new(),
        }
    }

    pub fn power(&self) -> u32 {
        self.power
    }

    pub fn clkcr(&self) -> u32 {
        self.clkcr
    }

    pub fn mask(&self) -> u32 {
        self.mask
    }

    pub fn dtimer(&self) -> u32 {
        self.dtimer
    }

    /// Raw STA, without the computed FIFO and DAT0 flags.
    pub fn sta(&self) -> u32 {
        self.sta
    }

    pub fn raise(&mut self, flags: Status) {
        self.sta |= flags.bits();
    }

    fn read(&mut self, offset: u32) -> u32 {
        match offset {
            SDMMC_STA => {
                let mut sta = self.sta;
                if self.fifo.is_empty() {
                    sta |= Status::RXFIFOE.bits();
                }
                if self.d0_low {
                    sta |= Status::BUSYD0.bits();
                }
                if self.busy {
                    // DAT0 is released right after this read
                    sta |= Status::BUSYD0.bits();
                    self.busy = false;
                    self.sta |= Status::BUSYD0END.bits();
                }
                sta
            }
            SDMMC_POWER => self.power,
            SDMMC_CLKCR => self.clkcr,
            SDMMC_ARG => self.arg,
            SDMMC_RESPCMD => self.respcmd,
            SDMMC_RESP1 => self.resp[0],
            SDMMC_RESP2 => self.resp[1],
            SDMMC_RESP3 => self.resp[2],
            SDMMC_RESP4 => self.resp[3],
            SDMMC_DTIMER => self.dtimer,
            SDMMC_DLEN => self.dlen,
            SDMMC_DCTRL => self.dctrl,
            SDMMC_DCOUNT => self.dcount,
            SDMMC_MASK => self.mask,
            SDMMC_IDMACTRL => self.idmactrl,
            SDMMC_IDMABASE => self.idmabase,
            SDMMC_FIFO => self.fifo.pop_front().unwrap_or(0),
            _ => 0,
        }
    }

    fn write(&mut self, offset: u32, value: u32) {
        match offset {
            SDMMC_POWER => self.write_power(value),
            SDMMC_CLKCR => self.clkcr = value,
            SDMMC_ARG => self.arg = value,
            SDMMC_CMD => {
                if value & SDMMC_CMD_CPSMEN != 0 {
                    self.execute(value);
                }
            }
            SDMMC_DTIMER => self.dtimer = value,
            SDMMC_DLEN => self.dlen = value,
            SDMMC_DCTRL => {
                if value & SDMMC_DCTRL_FIFORST != 0 {
                    self.fifo.clear();
                }
                self.dctrl = value & !SDMMC_DCTRL_FIFORST;
            }
            SDMMC_ICR => self.sta &= !value,
            SDMMC_MASK => self.mask = value,
            SDMMC_IDMACTRL => {
                self.idmactrl = value;
                if value & SDMMC_IDMACTRL_IDMAEN == 0 {
                    self.data_active = false;
                }
            }
            SDMMC_IDMABASE => self.idmabase = value,
            _ => {}
        }
    }

    fn write_power(&mut self, value: u32) {
        let ctrl = value & SDMMC_PWRCTRL_MASK;
        if ctrl == SDMMC_PWRCTRL_OFF || ctrl == SDMMC_PWRCTRL_CYCLE {
            self.card.power_off();
            self.d0_low = false;
        }
        let rising = value & !self.power & SDMMC_POWER_VSWITCH != 0;
        if rising && self.card.switch_pending && self.io_mv == SD_VOLTAGE_1V8 {
            self.card.switch_pending = false;
            self.d0_low = self.card.d0_sticks;
            self.sta |= Status::VSWEND.bits();
        }
        self.power = value;
    }

    fn execute(&mut self, cmdr: u32) {
        let index = (cmdr & SDMMC_CMD_INDEX_MASK) as u8;
        let arg = self.arg;
        self.commands.push((index, arg));

        if self.mute_responses > 0 {
            self.mute_responses -= 1;
            self.sta |= Status::CTIMEOUT.bits();
            return;
        }

        let app = std::mem::take(&mut self.card.app_cmd);
        let reply = self.respond(index, arg, app);

        match reply {
            Reply::None => self.sta |= Status::CMDSENT.bits(),
            Reply::Short(value) => self.short(index, value),
            Reply::Busy(value) => {
                self.short(index, value);
                self.busy = true;
            }
            Reply::Long(raw) => {
                self.resp = [raw[3], raw[2], raw[1], raw[0]];
                self.respcmd = 0x3f;
                self.sta |= Status::CMDREND.bits();
            }
            Reply::Timeout => self.sta |= Status::CTIMEOUT.bits(),
        }
    }

    fn short(&mut self, index: u8, value: u32) {
        self.resp = [value, 0, 0, 0];
        self.respcmd = index as u32;
        if std::mem::take(&mut self.misroute_response) {
            self.respcmd ^= 1;
        }
        if std::mem::take(&mut self.corrupt_response) {
            self.sta |= Status::CCRCFAIL.bits();
        } else {
            self.sta |= Status::CMDREND.bits();
        }
    }

    fn respond(&mut self, index: u8, arg: u32, app: bool) -> Reply {
        let model = self.card.model;
        let sdio = model == CardModel::Sdio;
        let addressed = arg >> 16 == self.card.rca as u32;
        if model == CardModel::Absent && index != SD_GO_IDLE_STATE {
            return Reply::Timeout;
        }

        match (index, app) {
            (SD_GO_IDLE_STATE, _) => {
                self.card.state = STATE_IDLE;
                Reply::None
            }
            (SD_SEND_IF_COND, _) => match model {
                CardModel::LegacySdsc | CardModel::Sdio => Reply::Timeout,
                _ => Reply::Short(self.card.cmd8_reply.unwrap_or(arg & 0xfff)),
            },
            (SDIO_SEND_OP_COND, _) if sdio => {
                let mut ocr = (1 << SDIO_R4_FUNCS_SHIFT) | SD_OCR_VOLTAGE_WINDOW;
                if arg != 0 {
                    ocr |= SD_OCR_BUSY;
                    self.card.state = STATE_READY;
                    if arg & SD_OCR_S18 != 0 && self.card.s18a {
                        ocr |= SD_OCR_S18;
                    }
                }
                Reply::Short(ocr)
            }
            (SDIO_SEND_OP_COND, _) => {
                self.card.illegal_pending = self.card.reports_illegal;
                Reply::Timeout
            }
            (SD_APP_CMD, _) if self.card.refuses_app_cmd => Reply::Short(self.card.status()),
            (SD_APP_CMD, _) if !sdio => {
                self.card.app_cmd = true;
                let mut status = self.card.status() | R1_APP_CMD;
                if std::mem::take(&mut self.card.illegal_pending) {
                    status |= R1_ILLEGAL_COMMAND;
                }
                Reply::Short(status)
            }
            (SD_APP_OP_COND, true) => {
                if arg == 0 {
                    return Reply::Short(SD_OCR_VOLTAGE_WINDOW);
                }
                if self.card.busy_left > 0 {
                    self.card.busy_left -= 1;
                    return Reply::Short(SD_OCR_VOLTAGE_WINDOW);
                }
                self.card.state = STATE_READY;
                let mut ocr = SD_OCR_BUSY | SD_OCR_VOLTAGE_WINDOW;
                if self.card.is_hc() && arg & SD_OCR_HCS != 0 {
                    ocr |= SD_OCR_HCS;
                }
                if arg & SD_OCR_S18 != 0 && self.card.s18a {
                    ocr |= SD_OCR_S18;
                }
                Reply::Short(ocr)
            }
            (SD_VOLTAGE_SWITCH, _) => {
                if self.card.state != STATE_READY || !self.card.s18a {
                    return Reply::Timeout;
                }
                self.card.switch_pending = true;
                self.d0_low = true;
                self.sta |= Status::CKSTOP.bits();
                Reply::Short(self.card.status())
            }
            (SD_ALL_SEND_CID, _) if self.card.state == STATE_READY => {
                self.card.state = STATE_IDENT;
                Reply::Long(CID)
            }
            (SD_SEND_RELATIVE_ADDR, _) => {
                self.card.rca = RCA;
                let r6 = ((RCA as u32) << 16) | self.card.status();
                self.card.state = STATE_STBY;
                Reply::Short(r6)
            }
            (SD_SEND_CSD, _) if addressed && !sdio => Reply::Long(self.card.csd()),
            (SD_SELECT_CARD, _) if addressed => {
                let status = self.card.status();
                self.card.state = STATE_TRAN;
                Reply::Busy(status)
            }
            (SD_SEND_STATUS, _) if addressed => Reply::Short(self.card.status()),
            (SD_SET_BLOCKLEN, _) => Reply::Short(self.card.status()),
            (SD_APP_SET_BUS_WIDTH, true) => Reply::Short(self.card.status() | R1_APP_CMD),
            (SD_APP_SEND_SCR, true) => {
                self.push_fifo(&SCR.to_be_bytes());
                Reply::Short(self.card.status() | R1_APP_CMD)
            }
            (SD_SWITCH_FUNC, false) => {
                let status = self.card.switch_status(arg);
                self.push_fifo(&status);
                Reply::Short(self.card.status())
            }
            (SDIO_RW_DIRECT, _) if sdio => Reply::Short(self.io_rw_direct(arg)),
            (SD_READ_SINGLE_BLOCK | SD_READ_MULTIPLE_BLOCK, _) => {
                let status = self.card.status();
                self.dma_transfer(arg, true);
                if index == SD_READ_MULTIPLE_BLOCK {
                    self.card.state = STATE_DATA;
                }
                Reply::Short(status)
            }
            (SD_WRITE_BLOCK | SD_WRITE_MULTIPLE_BLOCK, _) => {
                let status = self.card.status();
                self.dma_transfer(arg, false);
                if index == SD_WRITE_MULTIPLE_BLOCK {
                    self.card.state = STATE_RCV;
                }
                Reply::Short(status)
            }
            (SD_STOP_TRANSMISSION, _) => {
                let status = self.card.status();
                if self.card.state != STATE_DATA && self.card.state != STATE_RCV {
                    return Reply::Short(status | R1_ILLEGAL_COMMAND);
                }
                self.card.state = STATE_TRAN;
                Reply::Busy(status)
            }
            _ => Reply::Timeout,
        }
    }

    fn io_rw_direct(&mut self, arg: u32) -> u32 {
        let reg = ((arg >> 9) & 0x1_ffff) as usize;
        let write = arg & (1 << 31) != 0;
        if write && reg < SDIO_CCCR_SIZE {
            let mut value = (arg & 0xff) as u8;
            if reg == SDIO_CCCR_SPEED as usize {
                value &= SDIO_SPEED_SHS | SDIO_SPEED_EHS;
                if self.card.cccr[reg] & SDIO_SPEED_SHS == 0 {
                    value &= !SDIO_SPEED_EHS;
                }
                value |= self.card.cccr[reg] & SDIO_SPEED_SHS;
            }
            self.card.cccr[reg] = value;
        }
        let data = self.card.cccr.get(reg).copied().unwrap_or(0);
        (1 << 12) | data as u32
    }

    fn push_fifo(&mut self, bytes: &[u8]) {
        for word in bytes.chunks(4) {
            let mut le = [0u8; 4];
            le[..word.len()].copy_from_slice(word);
            self.fifo.push_back(u32::from_le_bytes(le));
        }
        self.sta |= (Status::DATAEND | Status::DBCKEND).bits();
    }

    fn dma_transfer(&mut self, arg: u32, read: bool) {
        if self.data_active {
            self.overlapping_transfers += 1;
        }
        self.data_active = true;

        if let Some(error) = self.inject_data_error.take() {
            self.dcount = self.dlen;
            self.sta |= error.bits();
            return;
        }

        let Some(host) = self.bus_to_host(self.idmabase, self.dlen as usize) else {
            self.dcount = self.dlen;
            self.sta |= Status::IDMATE.bits() | Status::DTIMEOUT.bits();
            return;
        };
        let first = self.card.lba(arg);
        let count = self.dlen as usize / SD_BLOCK_SIZE;
        for i in 0..count {
            let lba = first + i as u64;
            let addr = host + i * SD_BLOCK_SIZE;
            if read {
                let block = self.card.blocks.get(&lba).copied().unwrap_or([0; SD_BLOCK_SIZE]);
                unsafe {
                    std::ptr::copy_nonoverlapping(block.as_ptr(), addr as *mut u8, SD_BLOCK_SIZE)
                };
            } else {
                let mut block = [0u8; SD_BLOCK_SIZE];
                unsafe {
                    std::ptr::copy_nonoverlapping(addr as *const u8, block.as_mut_ptr(), SD_BLOCK_SIZE)
                };
                self.card.blocks.insert(lba, block);
            }
        }
        self.dcount = 0;
        self.sta |= Status::DATAEND.bits();
    }

    fn bus_to_host(&self, bus: u32, len: usize) -> Option<usize> {
        self.mappings.iter().find_map(|&(host, size, base)| {
            let offset = bus.checked_sub(base)? as usize;
            (offset + len <= size).then_some(host + offset)
        })
    }

    fn map(&mut self, addr: usize, len: usize) -> Option<u32> {
        let end = addr.checked_add(len)?;
        if self
            .unreachable
            .iter()
            .any(|&(start, size)| addr < start + size && start < end)
        {
            return None;
        }
        if let Some(bus) = self.mappings.iter().find_map(|&(host, size, base)| {
            (addr >= host && end <= host + size).then(|| base + (addr - host) as u32)
        }) {
            return Some(bus);
        }
        let bus = self.next_bus;
        self.next_bus += (len as u32).div_ceil(0x1000) * 0x1000 + 0x1000;
        self.mappings.push((addr, len, bus));
        Some(bus)
    }
}

/// Register-level stand-in for a board with one SDMMC instance.
pub struct SimPlatform {
    sim: Mutex<Sim>,
    event: Mutex<()>,
    wakeup: Condvar,
    waits: AtomicU32,
    yields: AtomicU32,
}

impl SimPlatform {
    pub fn new(model: CardModel) -> Self {
        Self {
            sim: Mutex::new(Sim::new(model)),
            event: Mutex::new(()),
            wakeup: Condvar::new(),
            waits: AtomicU32::new(0),
            yields: AtomicU32::new(0),
        }
    }

    /// Times a caller went to sleep in `wait_on`.
    pub fn waits(&self) -> u32 {
        self.waits.load(Ordering::Relaxed)
    }

    pub fn yields(&self) -> u32 {
        self.yields.load(Ordering::Relaxed)
    }

    pub fn sim(&self) -> MutexGuard<'_, Sim> {
        self.sim.lock().unwrap()
    }

    /// An interrupt is asserted; reads STA without side effects.
    pub fn irq_pending(&self) -> bool {
        let sim = self.sim();
        sim.sta & sim.mask != 0
    }

    pub fn commands(&self) -> Vec<(u8, u32)> {
        self.sim().commands.clone()
    }

    /// Commands issued after the first `mark` ones.
    pub fn commands_since(&self, mark: usize) -> Vec<(u8, u32)> {
        self.sim().commands[mark..].to_vec()
    }

    pub fn command_count(&self) -> usize {
        self.sim().commands.len()
    }

    pub fn fill_block(&self, lba: u64, seed: u8) {
        self.sim().card.blocks.insert(lba, pattern(seed));
    }

    pub fn block(&self, lba: u64) -> [u8; SD_BLOCK_SIZE] {
        self.sim()
            .card
            .blocks
            .get(&lba)
            .copied()
            .unwrap_or([0; SD_BLOCK_SIZE])
    }

    pub fn mark_unreachable(&self, addr: usize, len: usize) {
        self.sim().unreachable.push((addr, len));
    }

    pub fn inject_data_error(&self, error: Status) {
        self.sim().inject_data_error = Some(error);
    }
}

impl SdmmcRegs for SimPlatform {
    fn read_reg32(&self, offset: u32) -> u32 {
        self.sim().read(offset)
    }

    fn write_reg32(&self, offset: u32, value: u32) {
        self.sim().write(offset, value)
    }
}

impl Osa for SimPlatform {
    fn delay_ms(&self, ms: u32) {
        self.sim().delays.push(ms);
    }

    fn yield_now(&self) {
        self.yields.fetch_add(1, Ordering::Relaxed);
        thread::yield_now();
    }

    fn wait_on(&self, word: &AtomicU32, expected: u32) {
        let guard = self.event.lock().unwrap();
        if word.load(Ordering::Acquire) == expected {
            self.waits.fetch_add(1, Ordering::Relaxed);
            // bounded so harness threads notice their stop flag
            let _ = self
                .wakeup
                .wait_timeout(guard, Duration::from_millis(10))
                .unwrap();
        }
    }

    fn wake_all(&self, _word: &AtomicU32) {
        let _guard = self.event.lock().unwrap();
        self.wakeup.notify_all();
    }
}

impl PowerOps for SimPlatform {
    fn set_supply_voltage(&self, mv: u32) -> u32 {
        let mut sim = self.sim();
        sim.supply_mv = if sim.supply_broken { 0 } else { mv };
        sim.supply_mv
    }

    fn set_io_voltage(&self, mv: u32) -> u32 {
        let mut sim = self.sim();
        sim.io_mv = mv;
        mv
    }

    fn reset_controller(&self) {
        self.sim().controller_resets += 1;
    }
}

impl CacheOps for SimPlatform {
    fn clean_range(&self, addr: usize, len: usize) {
        self.sim().cache_ops.push(CacheOp::Clean(addr, len));
    }

    fn invalidate_range(&self, addr: usize, len: usize) {
        self.sim().cache_ops.push(CacheOp::Invalidate(addr, len));
    }
}

impl DmaOps for SimPlatform {
    fn dma_address(&self, addr: usize, len: usize) -> Option<u32> {
        self.sim().map(addr, len)
    }

    fn scratch_block(&self) -> Option<&'static mut ScratchBlock> {
        let mut sim = self.sim();
        if std::mem::replace(&mut sim.scratch_claimed, true) {
            return None;
        }
        let block = Box::leak(Box::new(ScratchBlock::new()));
        if sim.scratch_unreachable {
            sim.unreachable.push((block.addr(), SD_BLOCK_SIZE));
        }
        Some(block)
    }
}

/// Block contents derived from `seed`.
pub fn pattern(seed: u8) -> [u8; SD_BLOCK_SIZE] {
    let mut block = [0u8; SD_BLOCK_SIZE];
    for (i, byte) in block.iter_mut().enumerate() {
        *byte = seed.wrapping_mul(31).wrapping_add(i as u8);
    }
    block
}

/// Cache-line aligned buffer of `N` bytes.
#[repr(C, align(64))]
pub struct Aligned<const N: usize>(pub [u8; N]);

impl<const N: usize> Aligned<N> {
    pub fn new() -> Box<Self> {
        Box::new(Self([0; N]))
    }
}

pub fn test_config() -> SdmmcConfig {
    SdmmcConfig::sd_card().with_retry_interval_ms(1)
}

/// Calls the interrupt handler whenever the simulated line is asserted.
pub struct IrqThread {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl IrqThread {
    pub fn spawn(platform: Arc<SimPlatform>, irq: IrqHandler<SimPlatform>) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let handle = {
            let stop = stop.clone();
            thread::spawn(move || {
                while !stop.load(Ordering::Acquire) {
                    if platform.irq_pending() {
                        irq.handle();
                    } else {
                        thread::yield_now();
                    }
                }
            })
        };
        Self {
            stop,
            handle: Some(handle),
        }
    }
}

impl Drop for IrqThread {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            handle.join().unwrap();
        }
    }
}

/// Worker and interrupt threads running against a simulated card.
pub struct Harness {
    pub platform: Arc<SimPlatform>,
    pub client: Sdmmc<SimPlatform>,
    stop: Arc<AtomicBool>,
    worker: Option<JoinHandle<Worker<SimPlatform>>>,
    irq: Option<IrqThread>,
}

impl Harness {
    pub fn start(model: CardModel) -> Self {
        Self::start_with(SimPlatform::new(model), test_config())
    }

    pub fn start_with(platform: SimPlatform, config: SdmmcConfig) -> Self {
        let platform = Arc::new(platform);
        let (client, mut worker) = Sdmmc::new(platform.clone(), config).unwrap();
        let irq = IrqThread::spawn(platform.clone(), client.irq_handler());

        let stop = Arc::new(AtomicBool::new(false));
        let handle = {
            let stop = stop.clone();
            thread::spawn(move || {
                while !stop.load(Ordering::Acquire) {
                    worker.poll();
                }
                worker
            })
        };

        Self {
            platform,
            client,
            stop,
            worker: Some(handle),
            irq: Some(irq),
        }
    }

    /// Waits for negotiation to finish.
    pub fn wait_ready(&self) {
        let deadline = Instant::now() + Duration::from_secs(10);
        while !self.client.is_ready() {
            assert!(Instant::now() < deadline, "card never became ready");
            thread::sleep(Duration::from_millis(1));
        }
    }

    /// Stops both threads and hands back the worker.
    pub fn stop(mut self) -> Worker<SimPlatform> {
        self.shutdown_threads().unwrap()
    }

    fn shutdown_threads(&mut self) -> Option<Worker<SimPlatform>> {
        self.stop.store(true, Ordering::Release);
        let worker = self.worker.take().map(|handle| handle.join().unwrap());
        self.irq.take();
        worker
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        self.shutdown_threads();
    }
}
