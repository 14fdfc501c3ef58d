
use std::io::{self, Write};
use std::rc::Rc;

use byteorder::{ByteOrder, LittleEndian};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Bytecode dialect. Selects word width, opcode numbering, the variable
/// high-bit layout and the unconditional-jump opcode byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ScriptVersion {
    V6,
    V7,
    V8,
}

impl ScriptVersion {
    fn wide(self) -> bool {
        matches!(self, ScriptVersion::V8)
    }

    fn jump_opcode(self) -> u8 {
        match self {
            ScriptVersion::V8 => 0x66,
            _ => 0x73,
        }
    }

    /// Size of an unconditional jump instruction (opcode + displacement).
    fn jump_len(self) -> usize {
        match self {
            ScriptVersion::V8 => 5,
            _ => 3,
        }
    }

    fn var_names(self) -> &'static [Option<&'static str>] {
        match self {
            ScriptVersion::V6 => VAR_NAMES6,
            ScriptVersion::V7 => VAR_NAMES7,
            ScriptVersion::V8 => VAR_NAMES8,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecompileOptions {
    pub version: ScriptVersion,
    /// Show the jump target offset in `if`/`while`/`else` block headers.
    pub always_show_offsets: bool,
    /// Leave conditional jumps as `goto` instead of reconstructing `if`.
    pub no_if: bool,
    /// Don't resolve jumps over the false branch into `else`.
    pub no_else: bool,
    /// Don't collapse `else { if` into `else if`.
    pub no_else_if: bool,
    /// Don't detect `while` loops.
    pub no_while: bool,
    /// Hide the `(HH)` opcode column.
    pub hide_opcode: bool,
    /// Hide the `[OOOO]` offset column.
    pub hide_offsets: bool,
    /// Abort on the first stack underflow instead of patching the output.
    pub halt_on_error: bool,
}

impl Default for DecompileOptions {
    fn default() -> Self {
        Self {
            version: ScriptVersion::V6,
            always_show_offsets: false,
            no_if: false,
            no_else: false,
            no_else_if: false,
            no_while: false,
            hide_opcode: false,
            hide_offsets: false,
            halt_on_error: false,
        }
    }
}

#[derive(Debug, Error)]
pub enum DescummError {
    #[error("unexpected end of script data at offset {0}")]
    Eof(usize),

    #[error("invalid opcode 0x{op:x} (stack count {depth})")]
    InvalidOpcode { op: u8, depth: usize },

    #[error("invalid opcode {menu}:0x{op:x} (stack count {depth})")]
    InvalidSubOpcode {
        menu: &'static str,
        op: u8,
        depth: usize,
    },

    #[error("No items on stack to pop!")]
    StackUnderflow,

    #[error("evaluation stack overflow (more than 128 entries)")]
    StackOverflow,

    #[error("stackList with variable number of arguments, cannot disassemble")]
    NonLiteralListCount,

    #[error("BlockStack full!")]
    BlockStackFull,

    #[error("Unknown script type!")]
    UnknownScriptType,

    #[error(transparent)]
    Io(#[from] io::Error),
}

const MAX_STACK: usize = 128;
const MAX_BLOCK_STACK: usize = 256;
const MAX_INDENT: usize = 127;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Oper {
    IsZero,
    Equal,
    NotEqual,
    Greater,
    Less,
    LessEqual,
    GreaterEqual,
    Add,
    Sub,
    Mul,
    Div,
    LogicalAnd,
    LogicalOr,
    BitAnd,
    BitOr,
    Mod,
}

impl Oper {
    fn text(self) -> &'static str {
        match self {
            Oper::IsZero => "0==",
            Oper::Equal => "==",
            Oper::NotEqual => "!=",
            Oper::Greater => ">",
            Oper::Less => "<",
            Oper::LessEqual => "<=",
            Oper::GreaterEqual => ">=",
            Oper::Add => "+",
            Oper::Sub => "-",
            Oper::Mul => "*",
            Oper::Div => "/",
            Oper::LogicalAnd => "&&",
            Oper::LogicalOr => "||",
            Oper::BitAnd => "&",
            Oper::BitOr => "|",
            Oper::Mod => "%",
        }
    }
}

/// Binary operators in opcode order. v6/v7 map opcodes 0x0E.. onto the first
/// twelve entries, v8 maps 0x08.. onto all fifteen.
const BINARY_OPS: [Oper; 15] = [
    Oper::Equal,
    Oper::NotEqual,
    Oper::Greater,
    Oper::Less,
    Oper::LessEqual,
    Oper::GreaterEqual,
    Oper::Add,
    Oper::Sub,
    Oper::Mul,
    Oper::Div,
    Oper::LogicalAnd,
    Oper::LogicalOr,
    Oper::BitAnd,
    Oper::BitOr,
    Oper::Mod,
];

const VAR_NAMES6: &[Option<&str>] = &[
    None,
    Some("g_ego"),
    Some("g_camera_cur_pos"),
    Some("g_have_msg"),
    Some("g_room"),
    Some("g_override"),
    None,
    None,
    Some("g_num_actor"),
    None,
    Some("g_drive_number"),
    Some("g_timer_1"),
    Some("g_timer_2"),
    Some("g_timer_3"),
    None,
    None,
    None,
    Some("g_camera_min"),
    Some("g_camera_max"),
    Some("g_timer_next"),
    Some("g_virtual_mouse_x"),
    Some("g_virtual_mouse_y"),
    Some("g_room_resource"),
    Some("g_last_sound"),
    Some("g_cutsceneexit_key"),
    Some("g_talk_actor"),
    Some("g_camera_fast"),
    Some("g_scroll_script"),
    Some("g_entry_script"),
    Some("g_entry_script_2"),
    Some("g_exit_script"),
    Some("g_exit_script_2"),
    Some("g_verb_script"),
    Some("g_sentence_script"),
    Some("g_hook_script"),
    Some("g_begin_cutscene_script"),
    Some("g_end_cutscene_script"),
    Some("g_char_inc"),
    Some("g_walkto_obj"),
    Some("g_debug_mode"),
    Some("g_heap_space"),
    Some("g_scr_width"),
    Some("g_restart_key"),
    Some("g_pause_key"),
    Some("g_mouse_x"),
    Some("g_mouse_y"),
    Some("g_timer"),
    Some("g_timer_4"),
    None,
    Some("g_video_mode"),
    Some("g_save_load_key"),
    Some("g_fixed_disk"),
    Some("g_cursor_state"),
    Some("g_user_put"),
    Some("g_scr_height"),
    None,
    Some("g_sound_thing"),
    Some("g_talkstop_key"),
    None,
    None,
    None,
    None,
    None,
    None,
    Some("g_sound_param"),
    Some("g_sound_param_2"),
    Some("g_sound_param_3"),
    Some("g_mouse_present"),
    Some("g_performance_1"),
    Some("g_performance_2"),
    None,
    Some("g_save_load_thing"),
    Some("g_new_room"),
    None,
    None,
    None,
    Some("g_ems_space"),
];

const VAR_NAMES7: &[Option<&str>] = &[
    None,
    Some("VAR_MOUSE_X"),
    Some("VAR_MOUSE_Y"),
    Some("VAR_VIRT_MOUSE_X"),
    Some("VAR_VIRT_MOUSE_Y"),
    Some("VAR_V6_SCREEN_WIDTH"),
    Some("VAR_V6_SCREEN_HEIGHT"),
    Some("VAR_CAMERA_POS_X"),
    Some("VAR_CAMERA_POS_Y"),
    Some("VAR_OVERRIDE"),
    Some("VAR_ROOM"),
    Some("VAR_ROOM_RESOURCE"),
    Some("VAR_TALK_ACTOR"),
    Some("VAR_HAVE_MSG"),
    Some("VAR_TIMER"),
    Some("VAR_TMR_4"),
    None,
    None,
    None,
    None,
    None,
    None,
    Some("VAR_LEFTBTN_DOWN"),
    Some("VAR_RIGHTBTN_DOWN"),
    Some("VAR_LEFTBTN_HOLD"),
    Some("VAR_RIGHTBTN_HOLD"),
    Some("VAR_PERFORMANCE_1"),
    Some("VAR_PERFORMANCE_2"),
    None,
    None,
    None,
    None,
    Some("VAR_V6_EMSSPACE"),
    None,
    Some("VAR_V6_RANDOM_NR"),
    Some("VAR_NEW_ROOM"),
    Some("VAR_WALKTO_OBJ"),
    None,
    Some("VAR_CAMERA_DEST_X"),
    Some("VAR_CAMERA_DEST_>"),
    Some("VAR_CAMERA_FOLLOWED_ACTOR"),
    None,
    None,
    None,
    None,
    None,
    None,
    None,
    None,
    None,
    Some("VAR_SCROLL_SCRIPT"),
    Some("VAR_ENTRY_SCRIPT"),
    Some("VAR_ENTRY_SCRIPT2"),
    Some("VAR_EXIT_SCRIPT"),
    Some("VAR_EXIT_SCRIPT2"),
    Some("VAR_VERB_SCRIPT"),
    Some("VAR_SENTENCE_SCRIPT"),
    Some("VAR_HOOK_SCRIPT"),
    Some("VAR_CUTSCENE_START_SCRIPT"),
    Some("VAR_CUTSCENE_END_SCRIPT"),
    Some("VAR_UNK_SCRIPT"),
    Some("VAR_UNK_SCRIPT2"),
    Some("VAR_CUTSCENEEXIT_KEY"),
    Some("VAR_RESTART_KEY"),
    Some("VAR_PAUSE_KEY"),
    Some("VAR_SAVELOADDIALOG_KEY"),
    Some("VAR_TALKSTOP_KEY"),
    None,
    None,
    None,
    None,
    None,
    None,
    None,
    None,
    None,
    None,
    None,
    None,
    None,
    None,
    None,
    None,
    None,
    None,
    None,
    None,
    None,
    None,
    None,
    None,
    None,
    None,
    None,
    None,
    None,
    None,
    None,
    Some("VAR_TIMER_NEXT"),
    Some("VAR_TMR_1"),
    Some("VAR_TMR_2"),
    Some("VAR_TMR_3"),
    Some("VAR_CAMERA_MIN_X"),
    Some("VAR_CAMERA_MAX_X"),
    Some("VAR_CAMERA_MIN_Y"),
    Some("VAR_CAMERA_MAX_Y"),
    Some("VAR_CAMERA_THRESHOLD_X"),
    Some("VAR_CAMERA_THRESHOLD_Y"),
    Some("VAR_CAMERA_SPEED_X"),
    Some("VAR_CAMERA_SPEED_Y"),
    Some("VAR_CAMERA_ACCEL_X"),
    Some("VAR_CAMERA_ACCEL_Y"),
    Some("VAR_EGO"),
    Some("VAR_CURSORSTATE"),
    Some("VAR_USERPUT"),
    Some("VAR_DEFAULT_TALK_DELAY"),
    Some("VAR_CHARINC"),
    Some("VAR_DEBUGMODE"),
    None,
    None,
    Some("VAR_CHARSET_MASK"),
    None,
    None,
    None,
    Some("VAR_VIDEONAME"),
    None,
    None,
    None,
    None,
    None,
    None,
    Some("VAR_STRING2DRAW"),
    Some("VAR_CUSTOMSCALETABLE"),
];

const VAR_NAMES8: &[Option<&str>] = &[
    None,
    Some("room_width?"),
    Some("room_height?"),
    Some("cursor_screen_x"),
    Some("cursor_screen_y"),
    Some("cursor_x"),
    Some("cursor_y"),
    Some("cursor_state?"),
    Some("userface_state?"),
    Some("camera_x"),
    Some("camera_y"),
    Some("camera_dest_x"),
    Some("camera_dest_y"),
    None,
    None,
    Some("message_stuff?"),
    None,
    None,
    None,
    None,
    None,
    None,
    None,
    None,
    Some("timedate_year?"),
    Some("timedate_month?"),
    Some("timedate_day?"),
    Some("timedate_hour?"),
    Some("timedate_minute?"),
    Some("timedate_second?"),
    Some("override_hit"),
    Some("current_room"),
    None,
    None,
    None,
    None,
    None,
    None,
    None,
    Some("voice_text_mode"),
    None,
    None,
    Some("current_disk_number"),
    None,
    None,
    None,
    None,
    None,
    None,
    None,
    None,
    Some("script_before_roomentry"),
    Some("script_after_roomentry"),
    Some("script_before_roomexit"),
    Some("script_after_roomexit"),
    None,
    Some("sentence_script"),
    Some("pickup_script"),
    Some("cutscene_script"),
    Some("endcutscene_script"),
    None,
    None,
    None,
    None,
    Some("pause_key?"),
    Some("saveload_key?"),
    None,
    None,
    None,
    None,
    None,
    None,
    None,
    None,
    None,
    None,
    None,
    None,
    None,
    None,
    None,
    None,
    None,
    None,
    None,
    None,
    None,
    None,
    None,
    None,
    None,
    None,
    None,
    None,
    None,
    None,
    None,
    None,
    None,
    None,
    None,
    None,
    None,
    None,
    None,
    None,
    None,
    None,
    None,
    None,
    None,
    None,
    None,
    None,
    None,
    None,
    None,
    None,
    None,
    None,
    None,
    None,
    None,
    None,
    None,
    None,
    Some("default_actor"),
    None,
    None,
    Some("text_delay?"),
    Some("sputm_debug"),
    None,
];

fn var_name(version: ScriptVersion, id: u32) -> Option<&'static str> {
    let table = version.var_names();
    if (id as usize) < table.len() {
        table[id as usize]
    } else {
        None
    }
}

/// Positioned read over the script body. Words are 16-bit little-endian for
/// v6/v7 and 32-bit for v8; every read is bounds-checked.
struct Cursor<'a> {
    body: &'a [u8],
    pos: usize,
    wide: bool,
}

impl<'a> Cursor<'a> {
    fn new(body: &'a [u8], wide: bool) -> Self {
        Self { body, pos: 0, wide }
    }

    fn offset(&self) -> usize {
        self.pos
    }

    fn at_end(&self) -> bool {
        self.pos >= self.body.len()
    }

    fn peek(&self) -> Result<u8, DescummError> {
        self.body
            .get(self.pos)
            .copied()
            .ok_or(DescummError::Eof(self.pos))
    }

    fn byte(&mut self) -> Result<u8, DescummError> {
        let v = self.peek()?;
        self.pos += 1;
        Ok(v)
    }

    fn word(&mut self) -> Result<u32, DescummError> {
        let n = if self.wide { 4 } else { 2 };
        if self.body.len().saturating_sub(self.pos) < n {
            return Err(DescummError::Eof(self.pos));
        }
        let v = if self.wide {
            LittleEndian::read_u32(&self.body[self.pos..self.pos + 4])
        } else {
            LittleEndian::read_u16(&self.body[self.pos..self.pos + 2]) as u32
        };
        self.pos += n;
        Ok(v)
    }

    fn sword(&mut self) -> Result<i64, DescummError> {
        let v = self.word()?;
        if self.wide {
            Ok(v as i32 as i64)
        } else {
            Ok(v as u16 as i16 as i64)
        }
    }

    fn skip(&mut self, n: usize) -> Result<(), DescummError> {
        if self.body.len().saturating_sub(self.pos) < n {
            return Err(DescummError::Eof(self.pos));
        }
        self.pos += n;
        Ok(())
    }

    fn peek_at(&self, off: usize) -> Option<u8> {
        self.body.get(off).copied()
    }

    /// Signed word at an arbitrary offset, used only for jump-shape probing.
    fn peek_sword_at(&self, off: usize) -> Option<i64> {
        if self.wide {
            let b = self.body.get(off..off + 4)?;
            Some(LittleEndian::read_i32(b) as i64)
        } else {
            let b = self.body.get(off..off + 2)?;
            Some(LittleEndian::read_i16(b) as i64)
        }
    }
}

/// A reconstructed expression. `Dup` entries are shared between their two
/// stack slots through the surrounding `Rc`, which is what lets `kill`
/// recognize the discarded copy of a fanned-out value.
#[derive(Debug)]
enum StackEnt {
    Int(i64),
    Var(u32),
    Array {
        id: i32,
        dim2: Option<Rc<StackEnt>>,
        dim1: Rc<StackEnt>,
    },
    Unary {
        op: Oper,
        operand: Rc<StackEnt>,
    },
    Binary {
        op: Oper,
        left: Rc<StackEnt>,
        right: Rc<StackEnt>,
    },
    Complex(String),
    List(Vec<Rc<StackEnt>>),
    Dup(u32),
    Neg(Rc<StackEnt>),
}

fn render_var(raw: u32, out: &mut String, version: ScriptVersion) {
    if version == ScriptVersion::V8 {
        if raw & 0xF000_0000 == 0 {
            let id = raw & 0x0FFF_FFFF;
            match var_name(version, id) {
                Some(name) => out.push_str(name),
                None => out.push_str(&format!("var{id}")),
            }
        } else if raw & 0x8000_0000 != 0 {
            out.push_str(&format!("bitvar{}", raw & 0x7FFF_FFFF));
        } else if raw & 0x4000_0000 != 0 {
            out.push_str(&format!("localvar{}", raw & 0x0FFF_FFFF));
        } else {
            out.push_str(&format!("?var?{raw}"));
        }
    } else if raw & 0xF000 == 0 {
        let id = raw & 0xFFF;
        match var_name(version, id) {
            Some(name) => out.push_str(name),
            None => out.push_str(&format!("var{id}")),
        }
    } else if raw & 0x8000 != 0 {
        out.push_str(&format!("bitvar{}", raw & 0x7FFF));
    } else if raw & 0x4000 != 0 {
        out.push_str(&format!("localvar{}", raw & 0xFFF));
    } else {
        out.push_str(&format!("?var?{raw}"));
    }
}

/// Pretty-print an expression. Precedence is never reconstructed: binary
/// nodes always get parentheses unless the caller is a top-level predicate.
fn render_ent(se: &StackEnt, out: &mut String, wantparens: bool, version: ScriptVersion) {
    match se {
        StackEnt::Int(v) => out.push_str(&format!("{v}")),
        StackEnt::Var(raw) => render_var(*raw, out, version),
        StackEnt::Array { id, dim2, dim1 } => {
            out.push_str(&format!("array-{id}["));
            if let Some(d2) = dim2 {
                render_ent(d2, out, true, version);
                out.push_str("][");
            }
            render_ent(dim1, out, true, version);
            out.push(']');
        }
        StackEnt::Unary { op, operand } => {
            out.push_str(&format!("{} ", op.text()));
            render_ent(operand, out, true, version);
        }
        StackEnt::Binary { op, left, right } => {
            if wantparens {
                out.push('(');
            }
            render_ent(left, out, true, version);
            out.push_str(&format!(" {} ", op.text()));
            render_ent(right, out, true, version);
            if wantparens {
                out.push(')');
            }
        }
        StackEnt::Complex(s) => out.push_str(s),
        StackEnt::List(items) => {
            // Reverse of pop order: the last popped item was pushed first.
            out.push('[');
            for i in (0..items.len()).rev() {
                render_ent(&items[i], out, true, version);
                if i != 0 {
                    out.push(',');
                }
            }
            out.push(']');
        }
        StackEnt::Dup(idx) => out.push_str(&format!("dup[{idx}]")),
        StackEnt::Neg(inner) => {
            out.push('!');
            render_ent(inner, out, true, version);
        }
    }
}

/// One atom of a named call's argument list, in stream/stack consumption
/// order.
#[derive(Debug, Clone, Copy)]
enum Arg {
    /// Pop one expression.
    Pop,
    /// Pop an object reference; v6 pops a second (room, object) half.
    RoomObj,
    /// Decode an inline message string.
    Str,
    /// Read a word from the stream as an integer literal.
    Word,
    /// Read a word used as a jump target (wait-style opcodes).
    Jump,
    /// Pop a counted stack list.
    List,
}

const P: Arg = Arg::Pop;
const Z: Arg = Arg::RoomObj;
const S: Arg = Arg::Str;
const W: Arg = Arg::Word;
const J: Arg = Arg::Jump;
const L: Arg = Arg::List;

/// A sub-opcode inside an `x`/`y` style dispatch menu.
#[derive(Debug, Clone, Copy)]
struct SubOp {
    code: u8,
    name: &'static str,
    args: &'static [Arg],
}

const fn sub(code: u8, name: &'static str, args: &'static [Arg]) -> SubOp {
    SubOp { code, name, args }
}

#[derive(Debug, Clone, Copy)]
struct BlockFrame {
    #[allow(dead_code)]
    from: usize,
    to: usize,
    is_while: bool,
}

struct PendingElse {
    to: i64,
    offs: usize,
    opcode: u8,
    indent: usize,
}

fn fits16(v: i64) -> bool {
    (0..=0xFFFF).contains(&v)
}

struct Decompiler<'a, 'w> {
    opts: DecompileOptions,
    cursor: Cursor<'a>,
    stack: Vec<Rc<StackEnt>>,
    blocks: Vec<BlockFrame>,
    pending_else: Option<PendingElse>,
    have_else: bool,
    dup_index: u32,
    /// Offset of the first opcode contributing to the line being built.
    offs_of_line: usize,
    line: String,
    out: &'w mut dyn Write,
}

type Res = Result<(), DescummError>;

impl<'a, 'w> Decompiler<'a, 'w> {
    fn new(body: &'a [u8], opts: DecompileOptions, out: &'w mut dyn Write) -> Self {
        Self {
            cursor: Cursor::new(body, opts.version.wide()),
            opts,
            stack: Vec::new(),
            blocks: Vec::new(),
            pending_else: None,
            have_else: false,
            dup_index: 0,
            offs_of_line: 0,
            line: String::new(),
            out,
        }
    }

    fn version(&self) -> ScriptVersion {
        self.opts.version
    }

    // --- evaluation stack -------------------------------------------------

    fn push(&mut self, se: Rc<StackEnt>) -> Res {
        if self.stack.len() >= MAX_STACK {
            return Err(DescummError::StackOverflow);
        }
        self.stack.push(se);
        Ok(())
    }

    fn pop(&mut self) -> Result<Rc<StackEnt>, DescummError> {
        match self.stack.pop() {
            Some(se) => Ok(se),
            None if self.opts.halt_on_error => Err(DescummError::StackUnderflow),
            None => {
                writeln!(self.out, "No items on stack to pop!")?;
                Ok(Rc::new(StackEnt::Complex("**** INVALID DATA ****".into())))
            }
        }
    }

    fn render(&self, se: &StackEnt) -> String {
        let mut s = String::new();
        render_ent(se, &mut s, true, self.version());
        s
    }

    // --- statement builders ----------------------------------------------

    fn emit_assign(&mut self, dst: &StackEnt, src: &StackEnt) {
        let v = self.version();
        let mut s = String::new();
        render_ent(dst, &mut s, true, v);
        s.push_str(" = ");
        render_ent(src, &mut s, true, v);
        self.line.push_str(&s);
    }

    fn emit_add(&mut self, dst: &StackEnt, val: i32) {
        let v = self.version();
        let mut s = String::new();
        render_ent(dst, &mut s, true, v);
        s.push_str(&format!(" += {val}"));
        self.line.push_str(&s);
    }

    /// Discard the top of stack. A lone discard after a dup is the unused
    /// copy of a fanned-out value and produces no output.
    fn kill(&mut self, se: Rc<StackEnt>) -> Res {
        if matches!(*se, StackEnt::Dup(_)) {
            self.push(se)
        } else {
            let s = self.render(&se);
            self.line.push_str(&format!("pop({s})"));
            Ok(())
        }
    }

    /// Name a duplicated value. Plain integers are duplicated by value and
    /// an existing dup slot is reused; identity is what `kill` relies on.
    fn dup(&mut self, se: Rc<StackEnt>) -> Rc<StackEnt> {
        if matches!(*se, StackEnt::Int(_) | StackEnt::Dup(_)) {
            return se;
        }
        self.dup_index += 1;
        let d = Rc::new(StackEnt::Dup(self.dup_index));
        self.emit_assign(&d, &se);
        d
    }

    fn write_var(&mut self, id: u32, value: Rc<StackEnt>) {
        let dst = StackEnt::Var(id);
        self.emit_assign(&dst, &value);
    }

    fn write_array(
        &mut self,
        id: i32,
        dim2: Option<Rc<StackEnt>>,
        dim1: Rc<StackEnt>,
        value: Rc<StackEnt>,
    ) {
        let dst = StackEnt::Array { id, dim2, dim1 };
        self.emit_assign(&dst, &value);
    }

    fn add_var(&mut self, id: u32, val: i32) {
        let dst = StackEnt::Var(id);
        self.emit_add(&dst, val);
    }

    fn add_array(&mut self, id: i32, dim1: Rc<StackEnt>, val: i32) {
        let dst = StackEnt::Array {
            id,
            dim2: None,
            dim1,
        };
        self.emit_add(&dst, val);
    }

    // --- inline strings and stack lists ----------------------------------

    /// Decode a zero-terminated message. 0xFE/0xFF introduce markup escapes;
    /// plain bytes accumulate between double quotes and escapes break the
    /// quoted run.
    fn get_string(&mut self) -> Result<Rc<StackEnt>, DescummError> {
        let mut buf = String::new();
        let mut in_quotes = false;
        loop {
            let cmd = self.cursor.byte()?;
            if cmd == 0 {
                break;
            }
            if cmd == 0xFF || cmd == 0xFE {
                if in_quotes {
                    buf.push('"');
                    in_quotes = false;
                }
                let tag = self.cursor.byte()?;
                match tag {
                    1 => buf.push_str(":newline:"),
                    2 => buf.push_str(":keeptext:"),
                    3 => buf.push_str(":wait:"),
                    4 => {
                        let var = self.cursor.word()?;
                        buf.push(':');
                        render_var(var, &mut buf, self.version());
                        buf.push(':');
                    }
                    9 => {
                        let v = self.cursor.word()? as i32;
                        buf.push_str(&format!(":startanim={v}:"));
                    }
                    10 => {
                        buf.push_str(":sound:");
                        self.cursor.skip(14)?;
                    }
                    12 => {
                        let v = self.cursor.word()? as i32;
                        buf.push_str(&format!(":setcolor={v}:"));
                    }
                    13 => {
                        let v = self.cursor.word()? as i32;
                        buf.push_str(&format!(":unk2={v}:"));
                    }
                    14 => {
                        let v = self.cursor.word()? as i32;
                        buf.push_str(&format!(":setfont={v}:"));
                    }
                    other => {
                        let v = self.cursor.word()? as i32;
                        buf.push_str(&format!(":unk{other}={v}:"));
                    }
                }
            } else {
                if !in_quotes {
                    buf.push('"');
                    in_quotes = true;
                }
                buf.push(cmd as char);
            }
        }
        if in_quotes {
            buf.push('"');
        }
        Ok(Rc::new(StackEnt::Complex(buf)))
    }

    /// Pop a counted list: the literal count on top of the stack, then that
    /// many entries. Entries are kept in pop order.
    fn get_list(&mut self) -> Result<Vec<Rc<StackEnt>>, DescummError> {
        let count_ent = self.pop()?;
        let StackEnt::Int(n) = *count_ent else {
            return Err(DescummError::NonLiteralListCount);
        };
        if !(0..=MAX_STACK as i64).contains(&n) {
            return Err(DescummError::NonLiteralListCount);
        }
        let mut items = Vec::with_capacity(n as usize);
        for _ in 0..n {
            items.push(self.pop()?);
        }
        Ok(items)
    }

    // --- named calls ------------------------------------------------------

    fn collect_args(
        &mut self,
        atoms: &[Arg],
        args: &mut Vec<Rc<StackEnt>>,
    ) -> Res {
        for a in atoms {
            match a {
                Arg::Pop => args.push(self.pop()?),
                Arg::RoomObj => {
                    args.push(self.pop()?);
                    if self.version() < ScriptVersion::V7 {
                        args.push(self.pop()?);
                    }
                }
                Arg::Str => args.push(self.get_string()?),
                Arg::Word | Arg::Jump => {
                    let v = self.cursor.word()? as i32 as i64;
                    args.push(Rc::new(StackEnt::Int(v)));
                }
                Arg::List => args.push(Rc::new(StackEnt::List(self.get_list()?))),
            }
        }
        Ok(())
    }

    /// Render `[prefix]name(arg_{n-1},..,arg_0)`. A value-returning call is
    /// pushed as an opaque expression instead of emitted as a statement.
    fn finish_call(
        &mut self,
        returns: bool,
        prefix: Option<&'static str>,
        name: &'static str,
        args: Vec<Rc<StackEnt>>,
    ) -> Res {
        let v = self.version();
        let mut s = String::new();
        if let Some(p) = prefix {
            s.push_str(p);
        }
        s.push_str(name);
        s.push('(');
        for i in (0..args.len()).rev() {
            render_ent(&args[i], &mut s, true, v);
            if i != 0 {
                s.push(',');
            }
        }
        s.push(')');
        if returns {
            self.push(Rc::new(StackEnt::Complex(s)))
        } else {
            self.line.push_str(&s);
            Ok(())
        }
    }

    fn op_call(&mut self, name: &'static str, atoms: &[Arg]) -> Res {
        let mut args = Vec::new();
        self.collect_args(atoms, &mut args)?;
        self.finish_call(false, None, name, args)
    }

    fn op_func(&mut self, name: &'static str, atoms: &[Arg]) -> Res {
        let mut args = Vec::new();
        self.collect_args(atoms, &mut args)?;
        self.finish_call(true, None, name, args)
    }

    fn find_sub(
        &self,
        menu: &'static str,
        subs: &[SubOp],
        code: u8,
    ) -> Result<SubOp, DescummError> {
        subs.iter()
            .find(|s| s.code == code)
            .copied()
            .ok_or(DescummError::InvalidSubOpcode {
                menu,
                op: code,
                depth: self.stack.len(),
            })
    }

    /// `x` menu: the sub-opcode is the next stream byte.
    fn op_menu(&mut self, menu: &'static str, subs: &[SubOp]) -> Res {
        self.op_menu_full(false, None, menu, subs)
    }

    fn op_print(
        &mut self,
        prefix: &'static str,
        menu: &'static str,
        subs: &[SubOp],
    ) -> Res {
        self.op_menu_full(false, Some(prefix), menu, subs)
    }

    fn op_menu_full(
        &mut self,
        returns: bool,
        prefix: Option<&'static str>,
        menu: &'static str,
        subs: &[SubOp],
    ) -> Res {
        let code = self.cursor.byte()?;
        let sub = self.find_sub(menu, subs, code)?;
        let mut args = Vec::new();
        self.collect_args(sub.args, &mut args)?;
        self.finish_call(returns, prefix, sub.name, args)
    }

    /// `y` menu: arguments arrive as a stack list whose last element (in
    /// push order the first) selects the sub-opcode and is consumed.
    fn op_list_menu(&mut self, returns: bool, menu: &'static str, subs: &[SubOp]) -> Res {
        let mut items = self.get_list()?;
        let selector = items.pop();
        let code = match selector.as_deref() {
            Some(StackEnt::Int(v)) => *v as u8,
            _ => {
                return Err(DescummError::InvalidSubOpcode {
                    menu,
                    op: 0,
                    depth: self.stack.len(),
                })
            }
        };
        let sub = self.find_sub(menu, subs, code)?;
        let mut args = vec![Rc::new(StackEnt::List(items))];
        self.collect_args(sub.args, &mut args)?;
        self.finish_call(returns, None, sub.name, args)
    }

    // --- control-flow recovery -------------------------------------------

    /// Open a block for a forward jump, unless it would cross an enclosing
    /// block boundary. Marks the frame as a `while` when the instruction
    /// just before the target is an unconditional jump back to the start of
    /// the predicate's line.
    fn maybe_add_if(&mut self, cur: i64, to: i64) -> Result<bool, DescummError> {
        if !fits16(cur) || !fits16(to) || to <= cur {
            return Ok(false);
        }
        if self.blocks.iter().any(|b| to as usize > b.to) {
            return Ok(false);
        }
        if self.blocks.len() >= MAX_BLOCK_STACK {
            return Err(DescummError::BlockStackFull);
        }

        let l = self.version().jump_len();
        let to_u = to as usize;
        let mut is_while = false;
        if to_u >= l && self.cursor.peek_at(to_u - l) == Some(self.version().jump_opcode()) {
            if let Some(disp) = self.cursor.peek_sword_at(to_u - (l - 1)) {
                is_while = self.offs_of_line as i64 == to + disp;
            }
        }

        self.blocks.push(BlockFrame {
            from: cur as usize,
            to: to_u,
            is_while,
        });
        Ok(true)
    }

    /// An `else` is acceptable only when the topmost block ends exactly at
    /// this jump; the frame is replaced by the false-branch block.
    fn maybe_add_else(&mut self, cur: i64, to: i64) -> Result<bool, DescummError> {
        if !fits16(cur) || !fits16(to) || to <= cur {
            return Ok(false);
        }
        match self.blocks.last() {
            Some(top) if cur as usize == top.to => {}
            _ => return Ok(false),
        }
        let Some(saved) = self.blocks.pop() else {
            return Ok(false);
        };
        if self.maybe_add_if(cur, to)? {
            return Ok(true);
        }
        self.blocks.push(saved);
        Ok(false)
    }

    /// Detect `if (..) {..} else if (..) {..}`: the new block must end in an
    /// unconditional jump to the armed else target.
    fn maybe_add_else_if(&mut self, cur: i64, elseto: i64, to: i64) -> bool {
        if !fits16(cur) || !fits16(to) || !fits16(elseto) || elseto < to || to <= cur {
            return false;
        }
        let Some(top) = self.blocks.last() else {
            return false;
        };
        if top.is_while {
            return false;
        }
        let l = self.version().jump_len();
        let to_u = to as usize;
        if to_u < l {
            return false;
        }
        if self.cursor.peek_at(to_u - l) != Some(self.version().jump_opcode()) {
            return false;
        }
        let Some(disp) = self.cursor.peek_sword_at(to_u - (l - 1)) else {
            return false;
        };
        if to + disp != elseto {
            return false;
        }
        if let Some(top) = self.blocks.last_mut() {
            top.from = cur as usize;
            top.to = to_u;
        }
        true
    }

    fn do_jump(&mut self) -> Res {
        let offset = self.cursor.sword()?;
        let cur = self.cursor.offset() as i64;
        let to = cur + offset;

        if !self.opts.no_else && self.maybe_add_else(cur, to)? {
            self.pending_else = Some(PendingElse {
                to,
                offs: (cur - 1) as usize,
                opcode: self.version().jump_opcode(),
                indent: self.blocks.len(),
            });
            return Ok(());
        }

        if !self.opts.no_while {
            if let Some(top) = self.blocks.last() {
                // The back edge of a while; the closing brace renders it.
                if top.is_while && cur as usize == top.to {
                    return Ok(());
                }
            }
        }

        self.line.push_str(&format!("jump {:x}", to as i32));
        Ok(())
    }

    /// Conditional jump. `when` is true for jump-if-true opcodes; a
    /// structured block's predicate is negated in that case since source
    /// `if (P)` compiles to a jump-if-false past the body.
    fn do_jump_if(&mut self, se: Rc<StackEnt>, when: bool) -> Res {
        let offset = self.cursor.sword()?;
        let cur = self.cursor.offset() as i64;
        let to = cur + offset;
        let v = self.version();

        if !self.opts.no_else_if {
            if let Some(elseto) = self.pending_else.as_ref().map(|p| p.to) {
                if self.maybe_add_else_if(cur, elseto, to) {
                    self.pending_else = None;
                    self.have_else = true;
                    let se = if when { Rc::new(StackEnt::Neg(se)) } else { se };
                    self.line.push_str("} else if (");
                    render_ent(&se, &mut self.line, false, v);
                    if self.opts.always_show_offsets {
                        self.line.push_str(&format!(") /*{to:04X}*/ {{"));
                    } else {
                        self.line.push_str(") {");
                    }
                    return Ok(());
                }
            }
        }

        if !self.opts.no_if && self.maybe_add_if(cur, to)? {
            let is_while = !self.opts.no_while
                && self.blocks.last().map(|b| b.is_while).unwrap_or(false);
            self.line.push_str(if is_while { "while (" } else { "if (" });
            let se = if when { Rc::new(StackEnt::Neg(se)) } else { se };
            render_ent(&se, &mut self.line, false, v);
            if self.opts.always_show_offsets {
                self.line.push_str(&format!(") /*{to:04X}*/ {{"));
            } else {
                self.line.push_str(") {");
            }
            return Ok(());
        }

        self.line.push_str(if when { "if (" } else { "if (!" });
        render_ent(&se, &mut self.line, true, v);
        self.line.push_str(&format!(") goto {:x}", to as i32));
        Ok(())
    }

    // --- line emission ----------------------------------------------------

    fn output_line(
        &mut self,
        buf: &str,
        curoffs: Option<usize>,
        opcode: Option<u8>,
        indent: Option<usize>,
    ) -> Res {
        if buf.is_empty() {
            return Ok(());
        }
        let indent = indent.unwrap_or(self.blocks.len()).min(MAX_INDENT);
        let curoffs = curoffs.unwrap_or(self.cursor.offset());
        let pad = "  ".repeat(indent);

        if self.opts.hide_opcode {
            if self.opts.hide_offsets {
                writeln!(self.out, "{pad}{buf}")?;
            } else {
                writeln!(self.out, "[{curoffs:04X}] {pad}{buf}")?;
            }
        } else {
            let oc = match opcode {
                Some(op) => format!("{op:02X}"),
                None => "**".to_string(),
            };
            if self.opts.hide_offsets {
                writeln!(self.out, "({oc}) {pad}{buf}")?;
            } else {
                writeln!(self.out, "[{curoffs:04X}] ({oc}) {pad}{buf}")?;
            }
        }
        self.out.flush()?;
        Ok(())
    }

    fn write_pending_else(&mut self) -> Res {
        if let Some(p) = self.pending_else.take() {
            let buf = if self.opts.always_show_offsets {
                format!("}} else /*{:04X}*/ {{", p.to)
            } else {
                "} else {".to_string()
            };
            self.output_line(
                &buf,
                Some(p.offs),
                Some(p.opcode),
                Some(p.indent.saturating_sub(1)),
            )?;
        }
        Ok(())
    }

    fn close_block(&mut self, cur: usize) -> bool {
        let close = matches!(self.blocks.last(), Some(top) if cur >= top.to);
        if close {
            self.blocks.pop();
        }
        close
    }

    // --- drivers ----------------------------------------------------------

    fn run(&mut self) -> Res {
        self.offs_of_line = 0;
        while !self.cursor.at_end() {
            let opcode = self.cursor.peek()?;
            let depth_before = self.blocks.len();
            self.line.clear();

            if self.version() == ScriptVersion::V8 {
                self.op_v8()?;
            } else {
                self.op_v6()?;
            }

            if !self.line.is_empty() {
                self.write_pending_else()?;
                let mut indent = depth_before;
                if self.have_else {
                    self.have_else = false;
                    indent = indent.saturating_sub(1);
                }
                let line = std::mem::take(&mut self.line);
                self.output_line(&line, Some(self.offs_of_line), Some(opcode), Some(indent))?;
                self.offs_of_line = self.cursor.offset();
            }

            while self.close_block(self.cursor.offset()) {
                self.output_line("}", None, None, None)?;
            }
        }
        Ok(())
    }

    fn finish(&mut self) -> Res {
        writeln!(self.out, "END")?;
        writeln!(self.out, "Stack count: {}", self.stack.len())?;
        if !self.stack.is_empty() {
            writeln!(self.out, "Stack contents:")?;
            while let Some(se) = self.stack.pop() {
                let mut s = String::new();
                render_ent(&se, &mut s, true, self.version());
                writeln!(self.out, "{s}")?;
            }
        }
        self.out.flush()?;
        Ok(())
    }

    fn binary_op(&mut self, op: Oper) -> Res {
        let right = self.pop()?;
        let left = self.pop()?;
        self.push(Rc::new(StackEnt::Binary { op, left, right }))
    }

    /// v6/v7 opcode dispatch.
    fn op_v6(&mut self) -> Res {
        let code = self.cursor.byte()?;
        match code {
            0x00 => {
                let v = self.cursor.byte()? as i64;
                self.push(Rc::new(StackEnt::Int(v)))?;
            }
            0x01 => {
                let v = self.cursor.word()? as i32 as i64;
                self.push(Rc::new(StackEnt::Int(v)))?;
            }
            0x02 => {
                let id = self.cursor.byte()? as u32;
                self.push(Rc::new(StackEnt::Var(id)))?;
            }
            0x03 => {
                let id = self.cursor.word()?;
                self.push(Rc::new(StackEnt::Var(id)))?;
            }
            0x06 | 0x07 => {
                let dim1 = self.pop()?;
                let id = if code == 0x06 {
                    self.cursor.byte()? as i32
                } else {
                    self.cursor.word()? as i32
                };
                self.push(Rc::new(StackEnt::Array {
                    id,
                    dim2: None,
                    dim1,
                }))?;
            }
            0x0A | 0x0B => {
                let dim1 = self.pop()?;
                let dim2 = self.pop()?;
                let id = if code == 0x0A {
                    self.cursor.byte()? as i32
                } else {
                    self.cursor.word()? as i32
                };
                self.push(Rc::new(StackEnt::Array {
                    id,
                    dim2: Some(dim2),
                    dim1,
                }))?;
            }
            0x0C => {
                let se = self.pop()?;
                let d = self.dup(se);
                self.push(d.clone())?;
                self.push(d)?;
            }
            0x0D => {
                let operand = self.pop()?;
                self.push(Rc::new(StackEnt::Unary {
                    op: Oper::IsZero,
                    operand,
                }))?;
            }
            0x0E..=0x19 => self.binary_op(BINARY_OPS[(code - 0x0E) as usize])?,
            0x1A => {
                let se = self.pop()?;
                self.kill(se)?;
            }
            0x42 | 0x43 => {
                let value = self.pop()?;
                let id = if code == 0x42 {
                    self.cursor.byte()? as u32
                } else {
                    self.cursor.word()?
                };
                self.write_var(id, value);
            }
            0x46 | 0x47 => {
                let value = self.pop()?;
                let dim1 = self.pop()?;
                let id = if code == 0x46 {
                    self.cursor.byte()? as i32
                } else {
                    self.cursor.word()? as i32
                };
                self.write_array(id, None, dim1, value);
            }
            0x4A | 0x4B => {
                let value = self.pop()?;
                let dim1 = self.pop()?;
                let dim2 = self.pop()?;
                let id = if code == 0x4A {
                    self.cursor.byte()? as i32
                } else {
                    self.cursor.word()? as i32
                };
                self.write_array(id, Some(dim2), dim1, value);
            }
            0x4E | 0x4F => {
                let id = if code == 0x4E {
                    self.cursor.byte()? as u32
                } else {
                    self.cursor.word()?
                };
                self.add_var(id, 1);
            }
            0x52 | 0x53 => {
                let dim1 = self.pop()?;
                let id = if code == 0x52 {
                    self.cursor.byte()? as i32
                } else {
                    self.cursor.word()? as i32
                };
                self.add_array(id, dim1, 1);
            }
            0x56 | 0x57 => {
                let id = if code == 0x56 {
                    self.cursor.byte()? as u32
                } else {
                    self.cursor.word()?
                };
                self.add_var(id, -1);
            }
            0x5A | 0x5B => {
                let dim1 = self.pop()?;
                let id = if code == 0x5A {
                    self.cursor.byte()? as i32
                } else {
                    self.cursor.word()? as i32
                };
                self.add_array(id, dim1, -1);
            }
            0x5C => {
                let se = self.pop()?;
                self.do_jump_if(se, true)?;
            }
            0x5D => {
                let se = self.pop()?;
                self.do_jump_if(se, false)?;
            }
            0x5E => self.op_call("startScriptEx", &[L, P, P])?,
            0x5F => self.op_call("startScript", &[L, P])?,
            0x60 => self.op_call("startObject", &[L, P, P, P])?,
            0x61 => self.op_call("setObjectState", &[P, P])?,
            0x62 => self.op_call("setObjectXY", &[P, P, P])?,
            0x65 => self.op_call("stopObjectCodeA", &[])?,
            0x66 => self.op_call("stopObjectCodeB", &[])?,
            0x67 => self.op_call("endCutscene", &[])?,
            0x68 => self.op_call("beginCutscene", &[L])?,
            0x69 => self.op_call("stopMusic", &[])?,
            0x6A => self.op_call("freezeUnfreeze", &[P])?,
            0x6B => self.op_menu(
                "cursorCommand",
                &[
                    sub(0x90, "cursorOn", &[]),
                    sub(0x91, "cursorOff", &[]),
                    sub(0x92, "userPutOn", &[]),
                    sub(0x93, "userPutOff", &[]),
                    sub(0x94, "softCursorOn", &[]),
                    sub(0x95, "softCursorOff", &[]),
                    sub(0x96, "softUserputOn", &[]),
                    sub(0x97, "softUserputOff", &[]),
                    sub(0x99, "setCursorImg", &[P, P]),
                    sub(0x9A, "setCursorHotspot", &[P, P]),
                    sub(0x9C, "initCharset", &[P]),
                    sub(0x9D, "charsetColors", &[L]),
                    sub(0xD6, "makeCursorColorTransparent", &[P]),
                ],
            )?,
            0x6C => self.op_call("break", &[])?,
            0x6D => self.op_func("ifClassOfIs", &[L, P])?,
            0x6E => self.op_call("setClass", &[L, P])?,
            0x6F => self.op_func("getState", &[P])?,
            0x70 => self.op_call("setState", &[P, P])?,
            0x71 => self.op_call("setOwner", &[P, P])?,
            0x72 => self.op_func("getOwner", &[P])?,
            0x73 => self.do_jump()?,
            0x74 => self.op_call("startSound", &[P])?,
            0x75 => self.op_call("stopSound", &[P])?,
            0x76 => self.op_call("startMusic", &[P])?,
            0x77 => self.op_call("stopObjectScript", &[P])?,
            0x78 => {
                if self.version() < ScriptVersion::V7 {
                    self.op_call("panCameraTo", &[P])?;
                } else {
                    self.op_call("panCameraTo", &[P, P])?;
                }
            }
            0x79 => self.op_call("actorFollowCamera", &[P])?,
            0x7A => {
                if self.version() < ScriptVersion::V7 {
                    self.op_call("setCameraAt", &[P])?;
                } else {
                    self.op_call("setCameraAt", &[P, P])?;
                }
            }
            0x7B => self.op_call("loadRoom", &[P])?,
            0x7C => self.op_call("stopScript", &[P])?,
            0x7D => self.op_call("walkActorToObj", &[P, P, P])?,
            0x7E => self.op_call("walkActorTo", &[P, P, P])?,
            0x7F => self.op_call("putActorInRoom", &[P, P, P, P])?,
            0x80 => self.op_call("putActorAtObject", &[Z, P])?,
            0x81 => self.op_call("faceActor", &[P, P])?,
            0x82 => self.op_call("animateActor", &[P, P])?,
            0x83 => self.op_call("doSentence", &[P, P, P, P])?,
            0x84 => self.op_call("pickupObject", &[Z])?,
            0x85 => self.op_call("loadRoomWithEgo", &[P, P, Z, P])?,
            0x87 => self.op_func("getRandomNumber", &[P])?,
            0x88 => self.op_func("getRandomNumberRange", &[P, P])?,
            0x8A => self.op_func("getActorMoving", &[P])?,
            0x8B => self.op_func("isScriptRunning", &[P])?,
            0x8C => self.op_func("getActorRoom", &[P])?,
            0x8D => self.op_func("getObjectX", &[P])?,
            0x8E => self.op_func("getObjectY", &[P])?,
            0x8F => self.op_func("getObjectDir", &[P])?,
            0x90 => self.op_func("getActorWalkBox", &[P])?,
            0x91 => self.op_func("getActorCostume", &[P])?,
            0x92 => self.op_func("findInventory", &[P, P])?,
            0x93 => self.op_func("getInventoryCount", &[P])?,
            0x94 => self.op_func("getVerbFromXY", &[P, P])?,
            0x95 => self.op_call("beginOverride", &[])?,
            0x96 => self.op_call("endOverride", &[])?,
            0x97 => self.op_call("setObjectName", &[P, S])?,
            0x98 => self.op_func("isSoundRunning", &[P])?,
            0x99 => self.op_call("setBoxFlags", &[P, L])?,
            0x9A => self.op_call("createBoxMatrix", &[])?,
            0x9B => self.op_menu(
                "resourceRoutines",
                &[
                    sub(0x64, "loadScript", &[P]),
                    sub(0x65, "loadSound", &[P]),
                    sub(0x66, "loadCostume", &[P]),
                    sub(0x67, "loadRoom", &[P]),
                    sub(0x68, "nukeScript", &[P]),
                    sub(0x69, "nukeSound", &[P]),
                    sub(0x6A, "nukeCostume", &[P]),
                    sub(0x6B, "nukeRoom", &[P]),
                    sub(0x6C, "lockScript", &[P]),
                    sub(0x6D, "lockSound", &[P]),
                    sub(0x6E, "lockCostume", &[P]),
                    sub(0x6F, "lockRoom", &[P]),
                    sub(0x70, "unlockScript", &[P]),
                    sub(0x71, "unlockSound", &[P]),
                    sub(0x72, "unlockCostume", &[P]),
                    sub(0x73, "unlockRoom", &[P]),
                    sub(0x75, "loadCharset", &[P]),
                    sub(0x76, "nukeCharset", &[P]),
                    sub(0x77, "loadFlObject", &[Z]),
                ],
            )?,
            0x9C => self.op_menu(
                "roomOps",
                &[
                    sub(0xAC, "roomScroll", &[P, P]),
                    sub(0xAE, "setScreen", &[P, P]),
                    sub(0xAF, "setPalColor", &[P, P, P, P]),
                    sub(0xB0, "shakeOn", &[]),
                    sub(0xB1, "shakeOff", &[]),
                    sub(0xB3, "unkRoomFunc2", &[P, P, P]),
                    sub(0xB4, "saveLoadThing", &[P, P]),
                    sub(0xB5, "screenEffect", &[P]),
                    sub(0xB6, "unkRoomFunc2", &[P, P, P, P, P]),
                    sub(0xB7, "unkRoomFunc3", &[P, P, P, P, P]),
                    sub(0xBA, "palManipulate", &[P, P, P, P]),
                    sub(0xBB, "colorCycleDelay", &[P, P]),
                    sub(0xD5, "setPalette", &[P]),
                ],
            )?,
            0x9D => self.op_menu(
                "actorSet",
                &[
                    sub(0xC5, "setCurActor", &[P]),
                    sub(0x4C, "setActorCostume", &[P]),
                    sub(0x4D, "setActorWalkSpeed", &[P, P]),
                    sub(0x4E, "setActorSound", &[L]),
                    sub(0x4F, "setActorWalkFrame", &[P]),
                    sub(0x50, "setActorTalkFrame", &[P, P]),
                    sub(0x51, "setActorStandFrame", &[P]),
                    sub(0x52, "actorSet:82:??", &[P, P, P]),
                    sub(0x53, "initActor", &[]),
                    sub(0x54, "setActorElevation", &[]),
                    sub(0x55, "setActorDefAnim", &[]),
                    sub(0x56, "setActorPalette", &[P, P]),
                    sub(0x57, "setActorTalkColor", &[P]),
                    sub(0x58, "setActorName", &[S]),
                    sub(0x59, "setActorInitFrame", &[P]),
                    sub(0x5B, "setActorWidth", &[P]),
                    sub(0x5C, "setActorScale", &[P]),
                    sub(0x5D, "setActorNeverZClip", &[]),
                    sub(0x5E, "setActorNeverZClip", &[P]),
                    sub(0xE1, "setActorNeverZClip", &[P]),
                    sub(0x5F, "setActorIgnoreBoxes", &[]),
                    sub(0x60, "setActorFollowBoxes", &[]),
                    sub(0x61, "setActorAnimSpeed", &[]),
                    sub(0x62, "setActorShadowMode", &[]),
                    sub(0x63, "setActorTalkPos", &[P, P]),
                    sub(0xC6, "setActorAnimVar", &[P]),
                    sub(0xD7, "setActorIgnoreTurnsOn", &[]),
                    sub(0xD8, "setActorIgnoreTurnsOff", &[]),
                    sub(0xD9, "initActorLittle", &[]),
                    sub(0xE3, "setActorLayer", &[P]),
                    sub(0xE4, "setActorWalkScript", &[P]),
                    sub(0xE5, "setActorStanding", &[]),
                    sub(0xE6, "setActorDirection", &[P]),
                    sub(0xE7, "actorTurnToDirection", &[P]),
                    sub(0xE9, "freezeActor", &[]),
                    sub(0xEA, "unfreezeActor", &[]),
                    sub(0xEB, "setTalkScript", &[P]),
                ],
            )?,
            0x9E => self.op_menu(
                "verbOps",
                &[
                    sub(0xC4, "setCurVerb", &[P]),
                    sub(0x7C, "verbLoadImg", &[P]),
                    sub(0x7D, "verbLoadString", &[S]),
                    sub(0x7E, "verbSetColor", &[P]),
                    sub(0x7F, "verbSetHiColor", &[P]),
                    sub(0x80, "verbSetXY", &[P, P]),
                    sub(0x81, "verbSetCurmode1", &[]),
                    sub(0x82, "verbSetCurmode0", &[]),
                    sub(0x83, "verbKill", &[]),
                    sub(0x84, "verbInit", &[]),
                    sub(0x85, "verbSetDimColor", &[P]),
                    sub(0x86, "verbSetCurmode2", &[]),
                    sub(0x87, "verbSetKey", &[P]),
                    sub(0x88, "verbSetCenter", &[]),
                    sub(0x89, "verbSetToString", &[P]),
                    sub(0x8B, "verbSetToObject", &[P, P]),
                    sub(0x8C, "verbSetBkColor", &[P]),
                    sub(0xFF, "verbRedraw", &[]),
                ],
            )?,
            0x9F => self.op_func("getActorFromXY", &[P, P])?,
            0xA0 => self.op_func("findObject", &[P, P])?,
            0xA1 => self.op_call("pseudoRoom", &[L, P])?,
            0xA2 => self.op_func("getActorElevation", &[P])?,
            0xA3 => self.op_func("getVerbEntrypoint", &[P, P])?,
            0xA4 => self.op_menu(
                "arrayOps",
                &[
                    sub(0xCD, "arrayOps205", &[W, P, S]),
                    sub(0xD0, "arrayOps208", &[W, P, L]),
                    sub(0xD4, "arrayOps212", &[W, P, L, P]),
                ],
            )?,
            0xA5 => self.op_menu(
                "saveRestoreVerbs",
                &[
                    sub(0x8D, "saveRestoreA", &[P, P, P]),
                    sub(0x8E, "saveRestoreB", &[P, P, P]),
                    sub(0x8F, "saveRestoreC", &[P, P, P]),
                ],
            )?,
            0xA6 => self.op_call("drawBox", &[P, P, P, P, P])?,
            0xA8 => self.op_func("getActorWidth", &[P])?,
            0xA9 => self.op_menu(
                "wait",
                &[
                    sub(0xA8, "waitForActor", &[P, J]),
                    sub(0xA9, "waitForMessage", &[]),
                    sub(0xAA, "waitForCamera", &[]),
                    sub(0xAB, "waitForSentence", &[]),
                    sub(0xE2, "waitUntilActorDrawn", &[P, J]),
                    sub(0xE8, "waitUntilActorTurned", &[P, J]),
                ],
            )?,
            0xAA => self.op_func("getActorScaleX", &[P])?,
            0xAB => self.op_func("getActorAnimCounter1", &[P])?,
            0xAC => self.op_call("soundKludge", &[L])?,
            0xAD => self.op_func("isAnyOf", &[L, P])?,
            0xAE => self.op_menu(
                "quitPauseRestart",
                &[sub(0x9E, "pauseGame", &[]), sub(0xA0, "shutDown", &[])],
            )?,
            0xAF => self.op_func("isActorInBox", &[P])?,
            0xB0 => self.op_call("delay", &[P])?,
            0xB1 => self.op_call("delayLonger", &[P])?,
            0xB2 => self.op_call("delayVeryLong", &[P])?,
            0xB3 => self.op_call("stopSentence", &[])?,
            0xB4 => self.op_print("print_0_", "print_0", PRINT_SUBS_V6)?,
            0xB5 => self.op_print("print_1_", "print_1", PRINT_SUBS_V6)?,
            0xB6 => self.op_print("print_2_", "print_2", PRINT_SUBS_V6)?,
            0xB7 => self.op_print("print_3_", "print_3", PRINT_SUBS_V6)?,
            0xB8 => self.op_print("print_actor_", "print_actor", PRINT_ACTOR_SUBS_V6)?,
            0xB9 => self.op_print("print_ego_", "print_ego", PRINT_SUBS_V6)?,
            0xBA => self.op_call("talkActor", &[P, S])?,
            0xBB => self.op_call("talkEgo", &[S])?,
            0xBC => self.op_menu(
                "dim",
                &[
                    sub(0xC7, "dimType5", &[P, W]),
                    sub(0xC8, "dimType1", &[P, W]),
                    sub(0xC9, "dimType2", &[P, W]),
                    sub(0xCA, "dimType3", &[P, W]),
                    sub(0xCB, "dimType4", &[P, W]),
                    sub(0xCC, "nukeArray", &[W]),
                ],
            )?,
            0xBE => self.op_call("startObjectQuick", &[L, P, P])?,
            0xBF => self.op_call("startScriptQuick", &[L, P])?,
            0xC0 => self.op_menu(
                "dim2",
                &[
                    sub(0xC7, "dim2Type5", &[P, P, W]),
                    sub(0xC8, "dim2Type1", &[P, P, W]),
                    sub(0xC9, "dim2Type2", &[P, P, W]),
                    sub(0xCA, "dim2Type3", &[P, P, W]),
                    sub(0xCB, "dim2Type4", &[P, P, W]),
                ],
            )?,
            0xC4 => self.op_func("abs", &[P])?,
            0xC5 => self.op_func("getDistObjObj", &[P, P])?,
            0xC6 => self.op_func("getDistObjPt", &[P, P, P])?,
            0xC7 => self.op_func("getDistPtPt", &[P, P, P, P])?,
            0xC8 => self.op_func("kernelFunction", &[L])?,
            0xC9 => self.op_call("miscOps", &[L])?,
            0xCA => self.op_call("breakXTimes", &[P])?,
            0xCB => self.op_call("pickOneOf", &[L, P])?,
            0xCC => self.op_call("pickOneOfDefault", &[P, L, P])?,
            0xCD => self.op_call("o6_unknownCD", &[P, P, P, P])?,
            0xD2 => self.op_func("getAnimateVariable", &[P, P])?,
            0xD5 => self.op_call("jumpToScript", &[L, P, P])?,
            0xD6 => self.binary_op(Oper::BitAnd)?,
            0xD7 => self.binary_op(Oper::BitOr)?,
            0xD8 => self.op_func("isRoomScriptRunning", &[P])?,
            0xEC => self.op_func("getActorLayer", &[P])?,
            0xED => self.op_func("getObjectNewDir", &[P])?,
            _ => {
                return Err(DescummError::InvalidOpcode {
                    op: code,
                    depth: self.stack.len(),
                })
            }
        }
        Ok(())
    }

    /// v8 opcode dispatch. Shares all helpers with v6/v7; only the numbering
    /// and a few merged opcodes differ.
    fn op_v8(&mut self) -> Res {
        let code = self.cursor.byte()?;
        match code {
            0x01 => {
                let v = self.cursor.word()? as i32 as i64;
                self.push(Rc::new(StackEnt::Int(v)))?;
            }
            0x02 => {
                let id = self.cursor.word()?;
                self.push(Rc::new(StackEnt::Var(id)))?;
            }
            0x03 => {
                let dim1 = self.pop()?;
                let id = self.cursor.word()? as i32;
                self.push(Rc::new(StackEnt::Array {
                    id,
                    dim2: None,
                    dim1,
                }))?;
            }
            0x04 => {
                let dim1 = self.pop()?;
                let dim2 = self.pop()?;
                let id = self.cursor.word()? as i32;
                self.push(Rc::new(StackEnt::Array {
                    id,
                    dim2: Some(dim2),
                    dim1,
                }))?;
            }
            0x05 => {
                let se = self.pop()?;
                let d = self.dup(se);
                self.push(d.clone())?;
                self.push(d)?;
            }
            0x06 => {
                let se = self.pop()?;
                self.kill(se)?;
            }
            0x07 => {
                let operand = self.pop()?;
                self.push(Rc::new(StackEnt::Unary {
                    op: Oper::IsZero,
                    operand,
                }))?;
            }
            0x08..=0x16 => self.binary_op(BINARY_OPS[(code - 0x08) as usize])?,
            0x64 => {
                let se = self.pop()?;
                self.do_jump_if(se, true)?;
            }
            0x65 => {
                let se = self.pop()?;
                self.do_jump_if(se, false)?;
            }
            0x66 => self.do_jump()?,
            0x67 => self.op_call("break", &[])?,
            0x6A => self.op_call("delay", &[P])?,
            0x6B => self.op_call("delayLonger", &[P])?,
            0x6C => self.op_call("delayVeryLong", &[P])?,
            0x6D => {
                let value = self.pop()?;
                let id = self.cursor.word()?;
                self.write_var(id, value);
            }
            0x6E => {
                let id = self.cursor.word()?;
                self.add_var(id, 1);
            }
            0x6F => {
                let id = self.cursor.word()?;
                self.add_var(id, -1);
            }
            0x70 => self.op_menu(
                "dim",
                &[
                    sub(0x0A, "dim-scummvar", &[P, W]),
                    sub(0x0B, "dim-string", &[P, W]),
                    sub(0xCA, "undim", &[W]),
                ],
            )?,
            0x71 => {
                let value = self.pop()?;
                let dim1 = self.pop()?;
                let id = self.cursor.word()? as i32;
                self.write_array(id, None, dim1, value);
            }
            0x74 => self.op_menu(
                "dim2",
                &[
                    sub(0x0A, "dim2-scummvar", &[P, P, W]),
                    sub(0x0B, "dim2-string", &[P, P, W]),
                    sub(0xCA, "undim2", &[W]),
                ],
            )?,
            0x75 => {
                let value = self.pop()?;
                let dim1 = self.pop()?;
                let dim2 = self.pop()?;
                let id = self.cursor.word()? as i32;
                self.write_array(id, Some(dim2), dim1, value);
            }
            0x76 => match self.cursor.byte()? {
                0x14 => {
                    let id = self.cursor.word()? as i32;
                    let value = self.get_string()?;
                    let dim1 = self.pop()?;
                    self.write_array(id, None, dim1, value);
                }
                0x15 => {
                    let dim1 = self.pop()?;
                    let items = self.get_list()?;
                    let id = self.cursor.word()? as i32;
                    self.write_array(id, None, dim1, Rc::new(StackEnt::List(items)));
                }
                0x16 => {
                    let dim1 = self.pop()?;
                    let items = self.get_list()?;
                    let dim2 = self.pop()?;
                    let id = self.cursor.word()? as i32;
                    self.write_array(id, Some(dim2), dim1, Rc::new(StackEnt::List(items)));
                }
                _ => {}
            },
            0x79 => self.op_call("startScript", &[L, P, P])?,
            0x7A => self.op_call("startScriptQuick", &[L, P])?,
            0x7B => self.op_call("stopObjectCode", &[])?,
            0x7C => self.op_call("stopScript", &[P])?,
            0x7D => self.op_call("jumpToScript", &[L, P, P])?,
            0x7F => self.op_call("startObject", &[L, P, P, P])?,
            0x89 => self.op_call("setClassOf?", &[L, P])?,
            0x93 => self.op_print("printLine_", "printLine", PRINT_SUBS_V8)?,
            0x94 => self.op_print("printCursor_", "printCursor", PRINT_SUBS_V8)?,
            0x95 => self.op_print("printDebug_", "printDebug", PRINT_SUBS_V8)?,
            0x96 => self.op_print("printSystem_", "printSystem", PRINT_SUBS_V8)?,
            0x9C => self.op_menu(
                "cursorCommand",
                &[
                    sub(0xDC, "cursorOn", &[]),
                    sub(0xDD, "cursorOff", &[]),
                    sub(0xDE, "userPutOn", &[]),
                    sub(0xDF, "userPutOff", &[]),
                    sub(0xE0, "softCursorOn", &[]),
                    sub(0xE1, "softCursorOff", &[]),
                    sub(0xE2, "softUserputOn", &[]),
                    sub(0xE3, "softUserputOff", &[]),
                    sub(0xE4, "setCursorImg", &[P, P]),
                    sub(0xE5, "setCursorHotspot", &[P, P]),
                    sub(0xE6, "makeCursorColorTransparent", &[P]),
                    sub(0xE7, "initCharset", &[P]),
                    sub(0xE8, "charsetColors", &[L]),
                ],
            )?,
            0x9D => self.op_call("loadRoom", &[P])?,
            // Arg counts below 0xAC are partly guesswork.
            0x9E => self.op_call("loadRoomWithEgo", &[P, P, Z, P])?,
            0x9F => self.op_call("walkActorToObj", &[P, P, P])?,
            0xA0 => self.op_call("walkActorTo", &[P, P, P])?,
            0xA1 => self.op_call("putActorInRoom", &[P, P, P, P])?,
            0xA2 => self.op_call("putActorAtObject", &[P, P, P])?,
            0xA3 => self.op_call("faceActor", &[P, P])?,
            0xA4 => self.op_call("animateActor", &[P, P])?,
            0xA5 => self.op_call("doSentence", &[P, P, P, P])?,
            0xA6 => self.op_call("pickupObject", &[Z])?,
            0xAA => self.op_menu(
                "resourceRoutines",
                &[
                    sub(0x3C, "loadCharset", &[P]),
                    sub(0x3D, "loadCostume", &[P]),
                    sub(0x3E, "loadObject", &[P]),
                    sub(0x3F, "loadRoom", &[P]),
                    sub(0x40, "loadScript", &[P]),
                    sub(0x41, "loadSound", &[P]),
                    sub(0x42, "lockCostume", &[P]),
                    sub(0x43, "lockRoom", &[P]),
                    sub(0x44, "lockScript", &[P]),
                    sub(0x45, "lockSound", &[P]),
                    sub(0x46, "unlockCostume", &[P]),
                    sub(0x47, "unlockRoom", &[P]),
                    sub(0x48, "unlockScript", &[P]),
                    sub(0x49, "unlockSound", &[P]),
                    sub(0x4A, "nukeCostume", &[P]),
                    sub(0x4B, "nukeRoom", &[P]),
                    sub(0x4C, "nukeScript", &[P]),
                    sub(0x4D, "nukeSound", &[P]),
                ],
            )?,
            0xAB => self.op_menu(
                "roomOps",
                &[
                    sub(0x52, "setRoomPalette", &[]),
                    sub(0x55, "setRoomIntensity", &[]),
                    sub(0x57, "fade", &[P]),
                    sub(0x58, "setRoomColor", &[]),
                    sub(0x59, "transformRoom", &[]),
                    sub(0x5A, "colorCycleDelay", &[]),
                    sub(0x5B, "copyPalette", &[]),
                    sub(0x5C, "newPalette", &[]),
                    sub(0x5D, "saveGame", &[]),
                    sub(0x5E, "LoadGame", &[]),
                    sub(0x5F, "setRoomSaturation", &[]),
                ],
            )?,
            0xAC => self.op_menu(
                "actorOps",
                &[
                    sub(0x64, "setActorCostume", &[P]),
                    sub(0x65, "setActorWalkSpeed", &[P, P]),
                    sub(0x67, "setActorDefAnim", &[]),
                    sub(0x68, "setActorInitFrame", &[P]),
                    sub(0x69, "setActorTalkFrame", &[P, P]),
                    sub(0x6A, "setActorWalkFrame", &[P]),
                    sub(0x6B, "setActorStandFrame", &[P]),
                    sub(0x6C, "setActorAnimSpeed", &[]),
                    sub(0x6D, "setActorDefault", &[]),
                    sub(0x6E, "setActorElevation", &[]),
                    sub(0x6F, "setActorPalette", &[P, P]),
                    sub(0x70, "setActorTalkColor", &[P]),
                    sub(0x71, "setActorName", &[S]),
                    sub(0x72, "setActorWidth", &[P]),
                    sub(0x73, "setActorScale", &[P]),
                    sub(0x74, "setActorNeverZClip?", &[]),
                    sub(0x75, "setActorAlwayZClip?", &[P]),
                    sub(0x76, "setActorIgnoreBoxes", &[]),
                    sub(0x77, "setActorFollowBoxes", &[]),
                    sub(0x78, "actorSpecialDraw", &[P]),
                    sub(0x79, "setActorTalkPos", &[P, P]),
                    sub(0x7A, "initActor", &[P]),
                    sub(0x7B, "setActorAnimVar", &[P, P]),
                    sub(0x7C, "setActorIgnoreTurnsOn", &[]),
                    sub(0x7D, "setActorIgnoreTurnsOff", &[]),
                    sub(0x7E, "newActor", &[]),
                    sub(0x7F, "setActorLayer", &[P]),
                    sub(0x80, "setActorStanding", &[]),
                    sub(0x81, "setActorDirection", &[P]),
                    sub(0x82, "actorTurnToDirection", &[P]),
                    sub(0x83, "setActorWalkScript", &[P]),
                    sub(0x84, "setTalkScript", &[P]),
                    sub(0x85, "freezeActor", &[]),
                    sub(0x86, "unfreezeActor", &[]),
                    sub(0x87, "setActorVolume", &[P]),
                    sub(0x88, "setActorFrequency", &[P]),
                    sub(0x89, "setActorPan", &[P]),
                ],
            )?,
            0xAD => self.op_menu(
                "cameraOps",
                &[
                    sub(0x32, "freezeCamera", &[]),
                    sub(0x33, "unfreezeCamera", &[]),
                ],
            )?,
            0xAE => self.op_menu(
                "verbOps",
                &[
                    sub(0x96, "verbInit", &[P]),
                    sub(0x97, "verbNew", &[]),
                    sub(0x98, "verbDelete", &[]),
                    sub(0x99, "verbLoadString", &[S]),
                    sub(0x9A, "verbSetXY", &[P, P]),
                    sub(0x9B, "verbOn", &[]),
                    sub(0x9C, "verbOff", &[]),
                    sub(0x9D, "verbSetColor", &[P]),
                    sub(0x9E, "verbSetHiColor", &[P]),
                    sub(0xA0, "verbSetDimColor", &[P]),
                    sub(0xA1, "verbSetDim", &[]),
                    sub(0xA2, "verbSetKey", &[P]),
                    sub(0xA3, "verbLoadImg", &[P]),
                    sub(0xA4, "verbSetToString", &[P]),
                    sub(0xA5, "verbSetCenter", &[]),
                    sub(0xA6, "verbSetCharset", &[P]),
                    sub(0xA7, "verbSetLineSpacing", &[P]),
                ],
            )?,
            0xB1 => self.op_call("stopSound", &[P])?,
            0xB2 => self.op_call("soundKludge", &[L])?,
            0xB3 => self.op_menu(
                "system",
                &[sub(0x28, "restart", &[]), sub(0x29, "quit", &[])],
            )?,
            0xBA => self.op_list_menu(
                false,
                "kludge",
                &[
                    sub(0x0B, "lockObject", &[]),
                    sub(0x0C, "unlockObject", &[]),
                    sub(0x0D, "remapCostume", &[]),
                    sub(0x0E, "remapCostumeInsert", &[]),
                    sub(0x0F, "setVideoFrameRate", &[]),
                    sub(0x16, "setBannerColors", &[]),
                    sub(0x1D, "setKeyScript", &[]),
                    sub(0x1E, "killAllScriptsButMe", &[]),
                    sub(0x1F, "stopAllVideo", &[]),
                    sub(0x20, "writeRegistryValue", &[]),
                    sub(0x6C, "buildPaletteShadow", &[]),
                ],
            )?,
            0xCD => self.op_func("isAnyOf", &[L, P])?,
            0xCE => self.op_func("getRandomNumber", &[P])?,
            0xCF => self.op_func("getRandomNumberRange", &[P, P])?,
            0xD0 => self.op_func("ifClassOfIs", &[L, P])?,
            0xD1 => self.op_func("getState", &[P])?,
            0xD2 => self.op_func("getOwner", &[P])?,
            0xD3 => self.op_func("isScriptRunning", &[P])?,
            0xD5 => self.op_func("isSoundRunning", &[P])?,
            0xD6 => self.op_func("abs", &[P])?,
            0xD8 => self.op_list_menu(
                true,
                "f-kludge",
                &[sub(0xE0, "readRegistryValue", &[])],
            )?,
            0xDB => self.op_func("getActorFromXY", &[P, P])?,
            0xDC => self.op_func("findObject", &[P, P])?,
            0xE1 => self.op_func("getAnimateVariable", &[P, P])?,
            0xE2 => self.op_func("getActorRoom", &[P])?,
            0xE3 => self.op_func("getActorWalkBox", &[P])?,
            0xE4 => self.op_func("getActorMoving", &[P])?,
            0xE5 => self.op_func("getActorCostume", &[P])?,
            0xE6 => self.op_func("getActorScaleX", &[P])?,
            0xE7 => self.op_func("getActorLayer", &[P])?,
            0xE8 => self.op_func("getActorElevation", &[P])?,
            0xE9 => self.op_func("getActorWidth", &[P])?,
            0xEA => self.op_func("getObjectDir", &[P])?,
            0xEB => self.op_func("getObjectX", &[P])?,
            0xEC => self.op_func("getObjectY", &[P])?,
            _ => {
                return Err(DescummError::InvalidOpcode {
                    op: code,
                    depth: self.stack.len(),
                })
            }
        }
        Ok(())
    }
}

const PRINT_SUBS_V6: &[SubOp] = &[
    sub(0x41, "XY", &[P, P]),
    sub(0x42, "color", &[P]),
    sub(0x43, "right", &[P]),
    sub(0x45, "center", &[]),
    sub(0x47, "left", &[]),
    sub(0x48, "overhead", &[]),
    sub(0x4A, "new3", &[]),
    sub(0x4B, "msg", &[S]),
    sub(0xFE, "begin", &[]),
    sub(0xFF, "end", &[]),
];

// print_actor's begin takes the actor off the stack.
const PRINT_ACTOR_SUBS_V6: &[SubOp] = &[
    sub(0x41, "XY", &[P, P]),
    sub(0x42, "color", &[P]),
    sub(0x43, "right", &[P]),
    sub(0x45, "center", &[]),
    sub(0x47, "left", &[]),
    sub(0x48, "overhead", &[]),
    sub(0x4A, "new3", &[]),
    sub(0x4B, "msg", &[S]),
    sub(0xFE, "begin", &[P]),
    sub(0xFF, "end", &[]),
];

const PRINT_SUBS_V8: &[SubOp] = &[
    sub(0xC8, "baseop", &[]),
    sub(0xC9, "end", &[]),
    sub(0xCA, "XY", &[P, P]),
    sub(0xCB, "color", &[P]),
    sub(0xCC, "center", &[]),
    sub(0xCD, "charset", &[]),
    sub(0xCE, "left", &[]),
    sub(0xCF, "overhead", &[]),
    sub(0xD0, "mumble", &[]),
    sub(0xD1, "msg", &[S]),
    sub(0xD2, "wrap", &[]),
];

/// Walk the verb event table: a zero-terminated run of (event code, word
/// offset) pairs. Each pair is echoed with its offset rebased onto the
/// bytecode body, and the body slice after the table is returned.
fn skip_verb_header<'a>(
    data: &'a [u8],
    out: &mut dyn Write,
) -> Result<&'a [u8], DescummError> {
    let mut n = 0usize;
    loop {
        let code = *data.get(n).ok_or(DescummError::Eof(n))?;
        n += 1;
        if code == 0 {
            break;
        }
        if data.len() < n + 2 {
            return Err(DescummError::Eof(n));
        }
        n += 2;
    }
    let hdrlen = n + 8;

    writeln!(out, "Events:")?;
    let mut i = 0usize;
    loop {
        let code = data[i];
        i += 1;
        if code == 0 {
            break;
        }
        let raw = LittleEndian::read_u16(&data[i..i + 2]);
        i += 2;
        let off = raw as i32 - hdrlen as i32;
        writeln!(out, "  {code:2X} - {off:04X}")?;
    }

    Ok(&data[n..])
}

/// Decompile a script container, streaming the listing into `out`. The
/// writer is flushed after every line, so everything emitted before a fatal
/// diagnostic survives the abort.
pub fn decompile_to(
    data: &[u8],
    options: DecompileOptions,
    out: &mut dyn Write,
) -> Result<(), DescummError> {
    if data.len() < 8 {
        return Err(DescummError::UnknownScriptType);
    }

    let body: &[u8] = match &data[0..4] {
        b"LSCR" => match options.version {
            ScriptVersion::V7 => {
                if data.len() < 10 {
                    return Err(DescummError::Eof(8));
                }
                let num = LittleEndian::read_u16(&data[8..10]);
                writeln!(out, "Script# {num}")?;
                &data[10..]
            }
            ScriptVersion::V6 => {
                if data.len() < 9 {
                    return Err(DescummError::Eof(8));
                }
                writeln!(out, "Script# {}", data[8])?;
                &data[9..]
            }
            // No known v8 local-script layout; refuse rather than guess.
            ScriptVersion::V8 => return Err(DescummError::UnknownScriptType),
        },
        b"SCRP" | b"ENCD" | b"EXDE" => &data[8..],
        b"VERB" => skip_verb_header(&data[8..], out)?,
        _ => return Err(DescummError::UnknownScriptType),
    };

    let mut d = Decompiler::new(body, options, out);
    d.run()?;
    d.finish()
}

/// Convenience wrapper collecting the listing into a string.
pub fn decompile(data: &[u8], options: DecompileOptions) -> Result<String, DescummError> {
    let mut buf = Vec::new();
    decompile_to(data, options, &mut buf)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cursor_word_width_follows_dialect() {
        let bytes = [0x34, 0x12, 0x78, 0x56];
        let mut narrow = Cursor::new(&bytes, false);
        assert_eq!(narrow.word().unwrap(), 0x1234);
        assert_eq!(narrow.word().unwrap(), 0x5678);
        let mut wide = Cursor::new(&bytes, true);
        assert_eq!(wide.word().unwrap(), 0x5678_1234);
    }

    #[test]
    fn cursor_sword_sign_extends() {
        let bytes = [0xF3, 0xFF, 0xFF, 0xFF];
        let mut narrow = Cursor::new(&bytes, false);
        assert_eq!(narrow.sword().unwrap(), -13);
        let mut wide = Cursor::new(&bytes, true);
        assert_eq!(wide.sword().unwrap(), -13);
    }

    #[test]
    fn cursor_reports_eof() {
        let mut c = Cursor::new(&[0x01], false);
        assert!(matches!(c.word(), Err(DescummError::Eof(_))));
    }

    fn var_text(raw: u32, version: ScriptVersion) -> String {
        let mut s = String::new();
        render_var(raw, &mut s, version);
        s
    }

    #[test]
    fn variable_classification_v6() {
        assert_eq!(var_text(1, ScriptVersion::V6), "g_ego");
        assert_eq!(var_text(9, ScriptVersion::V6), "var9");
        assert_eq!(var_text(200, ScriptVersion::V6), "var200");
        assert_eq!(var_text(0x8003, ScriptVersion::V6), "bitvar3");
        assert_eq!(var_text(0x4005, ScriptVersion::V6), "localvar5");
        assert_eq!(var_text(0x2001, ScriptVersion::V6), "?var?8193");
    }

    #[test]
    fn variable_classification_v8() {
        assert_eq!(var_text(1, ScriptVersion::V8), "room_width?");
        assert_eq!(var_text(0x8000_0003, ScriptVersion::V8), "bitvar3");
        assert_eq!(var_text(0x4000_0005, ScriptVersion::V8), "localvar5");
        assert_eq!(var_text(0x2000_0000, ScriptVersion::V8), "?var?536870912");
        assert_eq!(var_text(500, ScriptVersion::V8), "var500");
    }

    #[test]
    fn binary_rendering_parenthesizes() {
        let e = StackEnt::Binary {
            op: Oper::Add,
            left: Rc::new(StackEnt::Int(2)),
            right: Rc::new(StackEnt::Binary {
                op: Oper::Mul,
                left: Rc::new(StackEnt::Int(3)),
                right: Rc::new(StackEnt::Int(5)),
            }),
        };
        let mut s = String::new();
        render_ent(&e, &mut s, true, ScriptVersion::V6);
        assert_eq!(s, "(2 + (3 * 5))");
        let mut top = String::new();
        render_ent(&e, &mut top, false, ScriptVersion::V6);
        assert_eq!(top, "2 + (3 * 5)");
    }

    #[test]
    fn list_renders_in_push_order() {
        // Pop order a, b, c means the script pushed c, b, a.
        let e = StackEnt::List(vec![
            Rc::new(StackEnt::Int(1)),
            Rc::new(StackEnt::Int(2)),
            Rc::new(StackEnt::Int(3)),
        ]);
        let mut s = String::new();
        render_ent(&e, &mut s, true, ScriptVersion::V6);
        assert_eq!(s, "[3,2,1]");
    }

    #[test]
    fn name_tables_have_original_extents() {
        assert_eq!(VAR_NAMES6.len(), 77);
        assert_eq!(VAR_NAMES7.len(), 132);
        assert_eq!(VAR_NAMES8.len(), 132);
        assert_eq!(VAR_NAMES6[76], Some("g_ems_space"));
        assert_eq!(VAR_NAMES7[131], Some("VAR_CUSTOMSCALETABLE"));
        assert_eq!(VAR_NAMES8[126], Some("default_actor"));
    }
}
