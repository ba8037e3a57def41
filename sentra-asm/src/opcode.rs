//! The opcode catalogue.
//!
//! Conventions used by the operation summaries: `R(X)` is the register named
//! by operand `X` relative to the current frame base, `K(X)` is entry `X` of
//! the current prototype's constant table, `G(Bx)` is the global slot with
//! interned id `Bx`, and `U(X)` is upvalue `X` of the current closure. Jump
//! offsets are relative to the instruction after the jump.

use core::fmt;

/// Failed to retrieve an `Opcode` from a reserved byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InvalidOpcode;

impl fmt::Display for InvalidOpcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "InvalidOpcode")
    }
}

impl std::error::Error for InvalidOpcode {}

impl_opcodes! {
    "No operation."
    0x00 NOP nop "nop" [Ax]

    "`R(A) = R(B)`."
    0x01 MOVE mov "mov" [ABC]
    "`R(A) = K(Bx)`."
    0x02 LOADK loadk "loadk" [ABx]
    "`R(A) = bool(B)`; if `C != 0`, skip the next instruction."
    0x03 LOADBOOL loadbool "loadbool" [ABC]
    "`R(A) .. R(A+B) = nil`."
    0x04 LOADNIL loadnil "loadnil" [ABC]

    "`R(A) = R(B) + R(C)`. Two small ints stay int while representable; any float operand promotes the result to float."
    0x05 ADD add "add" [ABC]
    "`R(A) = R(B) - R(C)`."
    0x06 SUB sub "sub" [ABC]
    "`R(A) = R(B) * R(C)`. Small-int overflow promotes to float with the correctly rounded product."
    0x07 MUL mul "mul" [ABC]
    "`R(A) = R(B) / R(C)`. Integer division that does not divide evenly produces a float; integer division by zero is a `ValueError`."
    0x08 DIV div "div" [ABC]
    "`R(A) = R(B) % R(C)`."
    0x09 MOD modulo "mod" [ABC]
    "`R(A) = R(B) ^ R(C)`."
    0x0a POW pow "pow" [ABC]
    "`R(A) = -R(B)`."
    0x0b UNM unm "unm" [ABC]
    "`R(A) = R(B) + K(C)`."
    0x0c ADDK addk "addk" [ABC]
    "`R(A) = R(B) - K(C)`."
    0x0d SUBK subk "subk" [ABC]
    "`R(A) = R(B) * K(C)`."
    0x0e MULK mulk "mulk" [ABC]
    "`R(A) = R(B) / K(C)`."
    0x0f DIVK divk "divk" [ABC]
    "`R(A) = R(B) + sC`, where `sC` is a signed 8-bit immediate."
    0x10 ADDI addi "addi" [ABC]
    "`R(A) = R(B) - sC`, where `sC` is a signed 8-bit immediate."
    0x11 SUBI subi "subi" [ABC]
    "`R(A) = R(A) + 1`."
    0x12 INCR incr "incr" [ABC]

    "`R(A) = R(B) == R(C)` (deep equality for strings, arrays, maps)."
    0x13 EQ eq "eq" [ABC]
    "`R(A) = R(B) != R(C)`."
    0x14 NEQ neq "neq" [ABC]
    "`R(A) = R(B) < R(C)`."
    0x15 LT lt "lt" [ABC]
    "`R(A) = R(B) <= R(C)`."
    0x16 LE le "le" [ABC]
    "`R(A) = R(B) > R(C)`."
    0x17 GT gt "gt" [ABC]
    "`R(A) = R(B) >= R(C)`."
    0x18 GE ge "ge" [ABC]

    "If `R(A) < R(B)`, jump by `sC`."
    0x19 LTJ ltj "ltj" [ABC]
    "If `R(A) <= R(B)`, jump by `sC`."
    0x1a LEJ lej "lej" [ABC]
    "If `R(A) == R(B)`, jump by `sC`."
    0x1b EQJ eqj "eqj" [ABC]
    "If `R(A) != R(B)`, jump by `sC`."
    0x1c NEJ nej "nej" [ABC]
    "If `R(A) < K(B)`, jump by `sC`."
    0x1d LTJK ltjk "ltjk" [ABC]
    "If `R(A) <= K(B)`, jump by `sC`."
    0x1e LEJK lejk "lejk" [ABC]
    "If `R(A) == K(B)`, jump by `sC`."
    0x1f EQJK eqjk "eqjk" [ABC]
    "If `R(A) != K(B)`, jump by `sC`."
    0x20 NEJK nejk "nejk" [ABC]
    "If `R(A) > K(B)`, jump by `sC`."
    0x21 GTJK gtjk "gtjk" [ABC]
    "If `R(A) >= K(B)`, jump by `sC`."
    0x22 GEJK gejk "gejk" [ABC]

    "`R(A) = G(Bx)`. `Bx` is an interned global id, not a constant index."
    0x23 GETGLOBAL getglobal "getglobal" [ABx]
    "`G(Bx) = R(A)`."
    0x24 SETGLOBAL setglobal "setglobal" [ABx]
    "`R(A) = U(B)`."
    0x25 GETUPVAL getupval "getupval" [ABC]
    "`U(B) = R(A)`."
    0x26 SETUPVAL setupval "setupval" [ABC]

    "`R(A) = {}` with capacity hint `B`."
    0x27 NEWTABLE newtable "newtable" [ABC]
    "`R(A) = [R(A+1) .. R(A+B)]`."
    0x28 NEWARRAY newarray "newarray" [ABC]
    "`R(A) = R(B)[R(C)]` (integer index for arrays, string key for maps)."
    0x29 GETTABLE gettable "gettable" [ABC]
    "`R(A)[R(B)] = R(C)`."
    0x2a SETTABLE settable "settable" [ABC]
    "`R(A) = R(B)[K(C)]`."
    0x2b GETTABLEK gettablek "gettablek" [ABC]
    "`R(A)[K(B)] = R(C)`."
    0x2c SETTABLEK settablek "settablek" [ABC]
    "`R(A+1) = R(B); R(A) = method K(C) of R(B)` — receiver binding for a method call."
    0x2d SELF self_bind "self" [ABC]
    "`R(A) = len(R(B))` for strings, arrays, and maps."
    0x2e LEN len "len" [ABC]
    "Append `R(B)` to array `R(A)`."
    0x2f APPEND append "append" [ABC]
    "`R(A) = ` last element removed from array `R(B)`."
    0x30 POP pop "pop" [ABC]
    "`R(A) = ` first element removed from array `R(B)`."
    0x31 SHIFT shift "shift" [ABC]
    "Insert `R(B)` at the front of array `R(A)`."
    0x32 UNSHIFT unshift "unshift" [ABC]
    "`R(A) = concat(R(B) .. R(C))` with `to_string` coercion applied to every operand."
    0x33 CONCAT concat "concat" [ABC]
    "`R(A) = ` array of the keys of map `R(B)`."
    0x34 KEYS keys "keys" [ABC]
    "`R(A) = ` whether map `R(B)` has key `R(C)`."
    0x35 HASKEY haskey "haskey" [ABC]
    "`R(A) = R(B)[C]`, array element at an 8-bit immediate index."
    0x36 GETARRAYI getarri "getarri" [ABC]
    "`R(A)[B] = R(C)`, array store at an 8-bit immediate index."
    0x37 SETARRAYI setarri "setarri" [ABC]
    "`R(A) = len(R(B))` where `R(B)` must be an array."
    0x38 ARRLEN arrlen "arrlen" [ABC]

    "`R(A) = uppercase(R(B))`."
    0x39 UPPER upper "upper" [ABC]
    "`R(A) = lowercase(R(B))`."
    0x3a LOWER lower "lower" [ABC]
    "`R(A) = trim(R(B))`."
    0x3b TRIM trim "trim" [ABC]
    "`R(A) = R(B) contains R(C)`."
    0x3c CONTAINS contains "contains" [ABC]
    "`R(A) = R(B) starts with R(C)`."
    0x3d STARTSWITH startswith "startswith" [ABC]
    "`R(A) = R(B) ends with R(C)`."
    0x3e ENDSWITH endswith "endswith" [ABC]
    "`R(A) = ` byte index of `R(C)` in `R(B)`, or `-1`."
    0x3f INDEXOF indexof "indexof" [ABC]
    "`R(A) = ` array of pieces of `R(B)` split by `R(C)`."
    0x40 SPLIT split "split" [ABC]
    "`R(A) = ` elements of array `R(B)` joined by `R(C)`."
    0x41 JOIN join "join" [ABC]
    "`R(A) = R(B)` with occurrences of `R(C)` replaced by `R(C+1)`."
    0x42 REPLACE replace "replace" [ABC]
    "`R(A) = R(B)[R(C) .. R(C+1)]`, half-open byte range."
    0x43 SLICESTR slicestr "slicestr" [ABC]
    "`R(A) = R(B) ++ R(C)`; both operands must already be strings."
    0x44 STRCAT strcat "strcat" [ABC]
    "`R(A) = ` byte length of string `R(B)`."
    0x45 STRLEN strlen "strlen" [ABC]
    "`R(A) = ` substring of `R(B)` starting at `R(C)` with length `R(C+1)`."
    0x46 SUBSTR substr "substr" [ABC]

    "`R(A) = abs(R(B))`."
    0x47 ABS abs "abs" [ABC]
    "`R(A) = sqrt(R(B))`."
    0x48 SQRT sqrt "sqrt" [ABC]
    "`R(A) = floor(R(B))`."
    0x49 FLOOR floor "floor" [ABC]
    "`R(A) = ceil(R(B))`."
    0x4a CEIL ceil "ceil" [ABC]
    "`R(A) = round(R(B))`, ties away from zero."
    0x4b ROUND round "round" [ABC]

    "Unconditional jump by `sBx`."
    0x4c JMP jmp "jmp" [AsBx]
    "If `truthy(R(A)) != bool(C)`, skip the next instruction."
    0x4d TEST test "test" [ABC]
    "If `truthy(R(B)) == bool(C)`, `R(A) = R(B)`; otherwise skip the next instruction."
    0x4e TESTSET testset "testset" [ABC]
    "Run the compiled integer loop cached under loop id `A`; on success the pc lands past the loop, on deopt execution falls through to the generic loop."
    0x4f JMPINTLOOP intloop "intloop" [ABC]
    "Numeric for-loop setup: `R(A) -= R(A+2)`, then jump by `sBx` to the matching FORLOOP. A zero step is a `ValueError`."
    0x50 FORPREP forprep "forprep" [AsBx]
    "Numeric for-loop step: `R(A) += R(A+2)`; while the counter remains within the limit, copy it to `R(A+3)` and jump back by `sBx`."
    0x51 FORLOOP forloop "forloop" [AsBx]
    "`R(A) = ` iterator over array, map, or string `R(B)`."
    0x52 ITERINIT iterinit "iterinit" [ABC]
    "Advance iterator `R(B)`: on a value, `R(A) = key/element` and `R(A+1) = value`; when exhausted, jump forward by `C`."
    0x53 ITERNEXT iternext "iternext" [ABC]

    "`R(A) = ` closure over prototype `Bx` of the current function, capturing per its upvalue descriptors."
    0x54 CLOSURE closure "closure" [ABx]
    "Call `R(A)` with `B-1` args from `R(A+1)` (`B == 0`: all up to top), expecting `C-1` results (`C == 0`: open-ended)."
    0x55 CALL call "call" [ABC]
    "Like CALL, but replaces the current frame instead of growing the stack."
    0x56 TAILCALL tailcall "tailcall" [ABC]
    "Return `B-1` values starting at `R(A)` (`B == 0`: all up to top)."
    0x57 RETURN ret "ret" [ABC]

    "`R(A) = ` new class named `K(Bx)`."
    0x58 CLASS class "class" [ABx]
    "`R(A) = ` new instance of class `R(B)` with empty fields."
    0x59 INSTANCE instance "instance" [ABC]
    "`R(A) = ` method `K(C)` resolved on the class of `R(B)`."
    0x5a GETMETHOD getmethod "getmethod" [ABC]
    "Define method `K(B)` of class `R(A)` as closure `R(C)`."
    0x5b SETMETHOD setmethod "setmethod" [ABC]
    "`R(A) = R(B).K(C)` — instance field, then method, then class static."
    0x5c GETPROP getprop "getprop" [ABC]
    "`R(A).K(B) = R(C)`."
    0x5d SETPROP setprop "setprop" [ABC]
    "Class `R(A)` inherits from class `R(B)`."
    0x5e INHERIT inherit "inherit" [ABC]
    "`R(A) = ` method `K(C)` resolved starting at the parent of the class of instance `R(B)`."
    0x5f SUPER super_bind "super" [ABC]

    "`R(A) = ` new fiber running closure `R(B)`."
    0x60 FIBER fiber "fiber" [ABC]
    "Suspend the current fiber yielding `R(A)`; the resumer's argument becomes the value of `R(A)` on re-entry."
    0x61 YIELD yield_op "yield" [ABC]
    "`R(A) = ` result of resuming fiber `R(B)` with `C` args from `R(B+1)`."
    0x62 RESUME resume "resume" [ABC]

    "Install an error handler at `pc + sBx` on the current frame."
    0x63 TRY try_op "try" [AsBx]
    "Pop the most recent error handler of the current frame."
    0x64 ENDTRY endtry "endtry" [Ax]
    "Throw `R(A)`, unwinding to the nearest handler."
    0x65 THROW throw "throw" [ABC]
    "`R(A) = ` the last caught error, clearing the slot."
    0x66 GETERROR geterror "geterror" [ABC]

    "Profiler hint: count one iteration of loop id `Ax`."
    0x67 HOTLOOP hotloop "hotloop" [Ax]
    "Profiler hint: record argument type feedback for the current call site."
    0x68 FUNCENTRY funcentry "funcentry" [Ax]
    "Print `R(A)` to standard output."
    0x69 PRINT print "print" [ABC]
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}
