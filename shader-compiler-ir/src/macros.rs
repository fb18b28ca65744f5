// SPDX-License-Identifier: LGPL-2.1-or-later
// See Notices.txt for copyright information

/// declare a fieldless enum where every enumerant has a textual form
macro_rules! impl_text_enum {
    (
        $(#[doc = $enum_doc:expr])+
        pub enum $name:ident {
            $(
                $(#[doc = $enumerant_doc:expr])+
                #[text = $text:literal]
                $enumerant:ident,
            )+
        }
    ) => {
        $(#[doc = $enum_doc])+
        #[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
        pub enum $name {
            $(
                $(#[doc = $enumerant_doc])+
                $enumerant,
            )+
        }

        impl $name {
            /// get textual form of `self`
            pub fn text(self) -> &'static str {
                match self {
                    $(
                        $name::$enumerant => $text,
                    )+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                f.pad(self.text())
            }
        }
    };
}
